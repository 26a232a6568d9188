//! XML-Antworten der BBB-API
//!
//! Jede Antwort ist ein `<response>`-Element mit `returncode` und optional
//! `messageKey`/`message`. Unbekannte Elemente werden ignoriert.

use serde::Deserialize;

/// Gemeinsamer Kopf jeder Antwort
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Kopf {
    #[serde(default)]
    pub returncode: String,
    #[serde(default, rename = "messageKey")]
    pub message_key: String,
    #[serde(default)]
    pub message: String,
}

impl Kopf {
    pub fn ist_erfolg(&self) -> bool {
        self.returncode == "SUCCESS"
    }
}

/// Antwort auf `create`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMeetingResponse {
    #[serde(rename = "meetingID")]
    pub meeting_id: String,
    #[serde(default, rename = "internalMeetingID")]
    pub internal_meeting_id: String,
    #[serde(default, rename = "attendeePW")]
    pub attendee_pw: String,
    #[serde(default, rename = "moderatorPW")]
    pub moderator_pw: String,
    #[serde(default, rename = "createTime")]
    pub create_time: u64,
    #[serde(default, rename = "voiceBridge")]
    pub voice_bridge: String,
    #[serde(default, rename = "hasUserJoined")]
    pub has_user_joined: bool,
    #[serde(default, rename = "messageKey")]
    pub message_key: String,
}

/// Ein Meeting (aus `getMeetings` bzw. `getMeetingInfo`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeetingInfo {
    #[serde(default, rename = "meetingName")]
    pub meeting_name: String,
    #[serde(rename = "meetingID")]
    pub meeting_id: String,
    #[serde(default, rename = "internalMeetingID")]
    pub internal_meeting_id: String,
    #[serde(default, rename = "createTime")]
    pub create_time: u64,
    #[serde(default, rename = "voiceBridge")]
    pub voice_bridge: String,
    #[serde(default, rename = "attendeePW")]
    pub attendee_pw: String,
    #[serde(default, rename = "moderatorPW")]
    pub moderator_pw: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub recording: bool,
    #[serde(default, rename = "hasUserJoined")]
    pub has_user_joined: bool,
    #[serde(default, rename = "participantCount")]
    pub participant_count: u32,
    #[serde(default, rename = "moderatorCount")]
    pub moderator_count: u32,
}

/// Antwort auf `getMeetings`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetMeetingsResponse {
    #[serde(default)]
    pub meetings: MeetingListe,
}

/// `<meetings>`-Container (leer bei `noMeetings`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeetingListe {
    #[serde(default)]
    pub meeting: Vec<MeetingInfo>,
}

/// Antwort auf `isMeetingRunning`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IsMeetingRunningResponse {
    #[serde(default)]
    pub running: bool,
}

/// Antwort auf `join` mit `redirect=false`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinResponse {
    #[serde(default)]
    pub meeting_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}
