//! Signierte API-Anfragen
//!
//! Jede Anfrage ist ein GET auf `{basis}{aktion}?{query}&checksum={pruefsumme}`.
//! Die Pruefsumme ist `hex(sha(aktion + query + secret))`, wahlweise mit
//! SHA-1 oder SHA-256.
//!
//! Parameter werden in der uebergebenen Reihenfolge kodiert. Es bleiben nur
//! `A-Z a-z 0-9 - _ . ~` unkodiert, alles andere wird als `%XX` der
//! UTF-8-Bytes geschrieben, Leerzeichen als `+`.

use serde::de::DeserializeOwned;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{ApiError, ApiResult};
use crate::responses::Kopf;

// ---------------------------------------------------------------------------
// Hash-Verfahren
// ---------------------------------------------------------------------------

/// Hash-Verfahren fuer die Pruefsumme
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ShaType {
    Sha1,
    #[default]
    Sha256,
}

impl ShaType {
    /// Unbekannte Werte fallen auf SHA-256 zurueck
    pub fn aus_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "SHA1" | "SHA-1" => ShaType::Sha1,
            _ => ShaType::Sha256,
        }
    }
}

impl From<&str> for ShaType {
    fn from(name: &str) -> Self {
        Self::aus_name(name)
    }
}

// ---------------------------------------------------------------------------
// Aktionen und Parameter
// ---------------------------------------------------------------------------

/// Erlaubte API-Aktionen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    End,
    GetMeetings,
    GetMeetingInfo,
    IsMeetingRunning,
    Join,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::End => "end",
            Action::GetMeetings => "getMeetings",
            Action::GetMeetingInfo => "getMeetingInfo",
            Action::IsMeetingRunning => "isMeetingRunning",
            Action::Join => "join",
        }
    }
}

/// Erlaubte Parameternamen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamName {
    MeetingId,
    RecordId,
    Name,
    AttendeePw,
    ModeratorPw,
    Password,
    FullName,
    Welcome,
    VoiceBridge,
    Record,
    AutoStartRecording,
    AllowStartStopRecording,
    DialNumber,
    WebVoice,
    LogoutUrl,
    MaxParticipants,
    Duration,
    UserId,
    CreateTime,
    WebVoiceConf,
    Publish,
    Redirect,
    ClientUrl,
    ConfigToken,
    AvatarUrl,
    ModeratorOnlyMessage,
}

impl ParamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamName::MeetingId => "meetingID",
            ParamName::RecordId => "recordID",
            ParamName::Name => "name",
            ParamName::AttendeePw => "attendeePW",
            ParamName::ModeratorPw => "moderatorPW",
            ParamName::Password => "password",
            ParamName::FullName => "fullName",
            ParamName::Welcome => "welcome",
            ParamName::VoiceBridge => "voiceBridge",
            ParamName::Record => "record",
            ParamName::AutoStartRecording => "autoStartRecording",
            ParamName::AllowStartStopRecording => "allowStartStopRecording",
            ParamName::DialNumber => "dialNumber",
            ParamName::WebVoice => "webVoice",
            ParamName::LogoutUrl => "logoutURL",
            ParamName::MaxParticipants => "maxParticipants",
            ParamName::Duration => "duration",
            ParamName::UserId => "userID",
            ParamName::CreateTime => "createTime",
            ParamName::WebVoiceConf => "webVoiceConf",
            ParamName::Publish => "publish",
            ParamName::Redirect => "redirect",
            ParamName::ClientUrl => "clientURL",
            ParamName::ConfigToken => "configToken",
            ParamName::AvatarUrl => "avatarURL",
            ParamName::ModeratorOnlyMessage => "moderatorOnlyMessage",
        }
    }
}

/// Ein Query-Parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: ParamName,
    pub value: String,
}

impl Param {
    pub fn neu(name: ParamName, value: impl ToString) -> Self {
        Self {
            name,
            value: value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Antwort-Umschlag
// ---------------------------------------------------------------------------

/// Geparster Antwort-Body plus Transport-Metadaten
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub body: T,
    /// `name=wert`-Paare aus den `Set-Cookie`-Headern
    pub cookies: Vec<String>,
}

// ---------------------------------------------------------------------------
// ApiRequest
// ---------------------------------------------------------------------------

/// Client fuer signierte Anfragen an einen BBB-Server
#[derive(Debug, Clone)]
pub struct ApiRequest {
    url: String,
    secret: String,
    sha: ShaType,
    http: reqwest::Client,
}

impl ApiRequest {
    /// Erstellt einen Client fuer die gegebene Basis-URL
    ///
    /// Die URL wird auf `.../api/` normalisiert.
    ///
    /// # Fehler
    /// `InvalidUrl` wenn die URL nicht mit `http://` oder `https://` beginnt
    pub fn neu(url: &str, secret: &str, sha: ShaType) -> ApiResult<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ApiError::InvalidUrl(url.to_string()));
        }

        let mut url = url.to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        if !url.ends_with("api/") {
            url.push_str("api/");
        }

        Ok(Self {
            url,
            secret: secret.to_string(),
            sha,
            http: reqwest::Client::new(),
        })
    }

    /// Normalisierte Basis-URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Verwendetes Hash-Verfahren
    pub fn sha(&self) -> ShaType {
        self.sha
    }

    /// Kodiert die Parameter als Query-String (Reihenfolge bleibt erhalten)
    pub fn build_params(&self, params: &[Param]) -> String {
        params
            .iter()
            .map(|p| {
                format!(
                    "{}={}",
                    urlencoding::encode(p.name.as_str()),
                    urlencoding::encode(&p.value)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
            .replace("%20", "+")
    }

    /// Berechnet die Pruefsumme fuer Aktion und Query-String
    pub fn checksum(&self, action: Action, query: &str) -> String {
        let eingabe = format!("{}{}{}", action.as_str(), query, self.secret);
        match self.sha {
            ShaType::Sha1 => hex::encode(Sha1::digest(eingabe.as_bytes())),
            ShaType::Sha256 => hex::encode(Sha256::digest(eingabe.as_bytes())),
        }
    }

    /// Baut die vollstaendige, signierte URL
    pub fn build_url(&self, action: Action, params: &[Param]) -> String {
        let query = self.build_params(params);
        let checksum = self.checksum(action, &query);
        if query.is_empty() {
            format!("{}{}?checksum={}", self.url, action.as_str(), checksum)
        } else {
            format!("{}{}?{}&checksum={}", self.url, action.as_str(), query, checksum)
        }
    }

    /// Fuehrt eine Anfrage aus und parst die XML-Antwort
    ///
    /// # Fehler
    /// - `Status` bei HTTP-Status ungleich 200
    /// - `Rejected` wenn `returncode` nicht `SUCCESS` ist
    pub async fn anfrage<T: DeserializeOwned>(
        &self,
        action: Action,
        params: &[Param],
    ) -> ApiResult<ApiResponse<T>> {
        let url = self.build_url(action, params);
        tracing::debug!(aktion = action.as_str(), "API-Anfrage");

        let antwort = self.http.get(&url).send().await?;
        if antwort.status() != reqwest::StatusCode::OK {
            return Err(ApiError::Status(antwort.status().as_u16()));
        }

        let cookies = antwort
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();

        let text = antwort.text().await?;

        let kopf: Kopf = quick_xml::de::from_str(&text)?;
        if !kopf.ist_erfolg() {
            tracing::warn!(
                aktion = action.as_str(),
                message_key = %kopf.message_key,
                "API-Anfrage abgelehnt"
            );
            return Err(ApiError::Rejected {
                message_key: kopf.message_key,
                message: kopf.message,
            });
        }

        let body: T = quick_xml::de::from_str(&text)?;
        Ok(ApiResponse { body, cookies })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
