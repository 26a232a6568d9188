//! Meeting-Verwaltung ueber die REST-API

use crate::error::ApiResult;
use crate::request::{Action, ApiRequest, Param, ParamName};
use crate::responses::{
    CreateMeetingResponse, GetMeetingsResponse, IsMeetingRunningResponse, Kopf, MeetingInfo,
};

/// Parameter fuer `create`
#[derive(Debug, Clone, Default)]
pub struct NeuesMeeting {
    pub name: String,
    pub meeting_id: String,
    pub attendee_pw: String,
    pub moderator_pw: String,
    pub welcome: String,
    pub record: bool,
    pub auto_start_recording: bool,
    pub allow_start_stop_recording: bool,
    pub voice_bridge: u32,
}

impl NeuesMeeting {
    fn params(&self) -> Vec<Param> {
        vec![
            Param::neu(ParamName::AllowStartStopRecording, self.allow_start_stop_recording),
            Param::neu(ParamName::AttendeePw, &self.attendee_pw),
            Param::neu(ParamName::AutoStartRecording, self.auto_start_recording),
            Param::neu(ParamName::MeetingId, &self.meeting_id),
            Param::neu(ParamName::ModeratorPw, &self.moderator_pw),
            Param::neu(ParamName::Name, &self.name),
            Param::neu(ParamName::Record, self.record),
            Param::neu(ParamName::VoiceBridge, self.voice_bridge),
            Param::neu(ParamName::Welcome, &self.welcome),
        ]
    }
}

impl ApiRequest {
    /// Legt ein Meeting an
    pub async fn create_meeting(&self, meeting: &NeuesMeeting) -> ApiResult<CreateMeetingResponse> {
        let antwort = self
            .anfrage::<CreateMeetingResponse>(Action::Create, &meeting.params())
            .await?;
        tracing::info!(meeting_id = %antwort.body.meeting_id, "Meeting angelegt");
        Ok(antwort.body)
    }

    /// Beendet ein Meeting (Moderator-Passwort wird nachgeschlagen)
    ///
    /// Gibt die vor dem Beenden abgefragten Meeting-Details zurueck.
    pub async fn end_meeting(&self, meeting_id: &str) -> ApiResult<MeetingInfo> {
        let info = self.get_meeting_info(meeting_id).await?;
        self.anfrage::<Kopf>(
            Action::End,
            &[
                Param::neu(ParamName::MeetingId, meeting_id),
                Param::neu(ParamName::Password, info.moderator_pw.as_str()),
            ],
        )
        .await?;
        tracing::info!(meeting_id = %meeting_id, "Meeting beendet");
        Ok(info)
    }

    /// Listet alle Meetings des Servers
    pub async fn get_meetings(&self) -> ApiResult<Vec<MeetingInfo>> {
        let antwort = self
            .anfrage::<GetMeetingsResponse>(Action::GetMeetings, &[])
            .await?;
        Ok(antwort.body.meetings.meeting)
    }

    /// Details eines Meetings
    pub async fn get_meeting_info(&self, meeting_id: &str) -> ApiResult<MeetingInfo> {
        let antwort = self
            .anfrage::<MeetingInfo>(
                Action::GetMeetingInfo,
                &[Param::neu(ParamName::MeetingId, meeting_id)],
            )
            .await?;
        Ok(antwort.body)
    }

    /// Prueft ob ein Meeting laeuft
    pub async fn is_meeting_running(&self, meeting_id: &str) -> ApiResult<bool> {
        let antwort = self
            .anfrage::<IsMeetingRunningResponse>(
                Action::IsMeetingRunning,
                &[Param::neu(ParamName::MeetingId, meeting_id)],
            )
            .await?;
        Ok(antwort.body.running)
    }

    /// Signierte Join-URL fuer einen Browser-Teilnehmer
    pub async fn join_url(
        &self,
        meeting_id: &str,
        user_name: &str,
        moderator: bool,
    ) -> ApiResult<String> {
        let passwort = self.passwort(meeting_id, moderator).await?;
        Ok(self.build_url(
            Action::Join,
            &[
                Param::neu(ParamName::FullName, user_name),
                Param::neu(ParamName::MeetingId, meeting_id),
                Param::neu(ParamName::Password, passwort),
            ],
        ))
    }

    /// Moderator- bzw. Teilnehmer-Passwort eines Meetings
    pub(crate) async fn passwort(&self, meeting_id: &str, moderator: bool) -> ApiResult<String> {
        let info = self.get_meeting_info(meeting_id).await?;
        Ok(if moderator {
            info.moderator_pw
        } else {
            info.attendee_pw
        })
    }
}
