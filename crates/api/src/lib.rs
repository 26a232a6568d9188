//! bbbot-api – Signierter REST-Client fuer BigBlueButton
//!
//! Baut signierte Anfragen (`checksum = hex(sha(aktion + query + secret))`),
//! fuehrt sie per HTTP GET aus und parst die XML-Antworten.

pub mod error;
pub mod join;
pub mod meetings;
pub mod request;
pub mod responses;

pub use error::{ApiError, ApiResult};
pub use join::{JoinApi, JoinCredentials};
pub use meetings::NeuesMeeting;
pub use request::{Action, ApiRequest, ApiResponse, Param, ParamName, ShaType};
pub use responses::{CreateMeetingResponse, MeetingInfo};
