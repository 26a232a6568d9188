//! REST-Join als Kollaborateur der Session
//!
//! Die Session haengt nur vom Trait `JoinApi` ab, damit Tests einen
//! Fake-Server einsetzen koennen.

use async_trait::async_trait;

use crate::error::{ApiError, ApiResult};
use crate::request::{Action, ApiRequest, Param, ParamName};
use crate::responses::JoinResponse;

/// Zugangsdaten aus einem erfolgreichen REST-Join
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinCredentials {
    /// URL des HTML5-Clients mit Session-Token
    pub join_url: String,
    /// Cookies fuer den WebSocket-Handshake (`name=wert`)
    pub cookies: Vec<String>,
    pub internal_user_id: String,
    pub auth_token: String,
    pub session_token: String,
    pub internal_meeting_id: String,
}

/// Tritt einem Meeting ueber die REST-API bei
#[async_trait]
pub trait JoinApi: Send + Sync {
    async fn join(
        &self,
        meeting_id: &str,
        user_name: &str,
        moderator: bool,
    ) -> ApiResult<JoinCredentials>;
}

#[async_trait]
impl JoinApi for ApiRequest {
    async fn join(
        &self,
        meeting_id: &str,
        user_name: &str,
        moderator: bool,
    ) -> ApiResult<JoinCredentials> {
        let passwort = self.passwort(meeting_id, moderator).await?;
        let antwort = self
            .anfrage::<JoinResponse>(
                Action::Join,
                &[
                    Param::neu(ParamName::FullName, user_name),
                    Param::neu(ParamName::MeetingId, meeting_id),
                    Param::neu(ParamName::Password, passwort),
                    Param::neu(ParamName::Redirect, false),
                ],
            )
            .await?;

        let body = antwort.body;
        let credentials = JoinCredentials {
            join_url: body.url.ok_or(ApiError::MissingField("url"))?,
            cookies: antwort.cookies,
            internal_user_id: body.user_id.ok_or(ApiError::MissingField("user_id"))?,
            auth_token: body.auth_token.ok_or(ApiError::MissingField("auth_token"))?,
            session_token: body
                .session_token
                .ok_or(ApiError::MissingField("session_token"))?,
            internal_meeting_id: body.meeting_id.ok_or(ApiError::MissingField("meeting_id"))?,
        };

        tracing::info!(
            meeting_id = %meeting_id,
            user_id = %credentials.internal_user_id,
            "REST-Join erfolgreich"
        );
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ShaType;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const INFO_XML: &str = "<response><returncode>SUCCESS</returncode><meetingID>demo</meetingID><attendeePW>ap</attendeePW><moderatorPW>mp</moderatorPW></response>";

    async fn server_mit_info() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/getMeetingInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INFO_XML))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn join_liefert_zugangsdaten_und_cookies() {
        let server = server_mit_info().await;
        Mock::given(method("GET"))
            .and(path("/api/join"))
            .and(query_param("password", "mp"))
            .and(query_param("redirect", "false"))
            .and(query_param("fullName", "Bot"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "JSESSIONID=abc123; Path=/; HttpOnly")
                    .set_body_string(
                        "<response><returncode>SUCCESS</returncode><messageKey>successfullyJoined</messageKey><meeting_id>int-1</meeting_id><user_id>w_bot</user_id><auth_token>tok</auth_token><session_token>sess</session_token><url>https://bbb.example/html5client/join?sessionToken=sess</url></response>",
                    ),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiRequest::neu(&server.uri(), "geheim", ShaType::Sha256).unwrap();
        let creds = api.join("demo", "Bot", true).await.unwrap();

        assert_eq!(creds.internal_meeting_id, "int-1");
        assert_eq!(creds.internal_user_id, "w_bot");
        assert_eq!(creds.auth_token, "tok");
        assert_eq!(creds.session_token, "sess");
        assert_eq!(creds.cookies, vec!["JSESSIONID=abc123".to_string()]);
    }

    #[tokio::test]
    async fn join_abgelehnt() {
        let server = server_mit_info().await;
        Mock::given(method("GET"))
            .and(path("/api/join"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<response><returncode>FAILED</returncode><messageKey>invalidPassword</messageKey><message>wrong password</message></response>",
            ))
            .mount(&server)
            .await;

        let api = ApiRequest::neu(&server.uri(), "geheim", ShaType::Sha256).unwrap();
        match api.join("demo", "Bot", false).await {
            Err(ApiError::Rejected { message_key, message }) => {
                assert_eq!(message_key, "invalidPassword");
                assert_eq!(message, "wrong password");
            }
            other => panic!("Unerwartet: {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_ohne_token_ist_unvollstaendig() {
        let server = server_mit_info().await;
        Mock::given(method("GET"))
            .and(path("/api/join"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<response><returncode>SUCCESS</returncode><meeting_id>int-1</meeting_id><user_id>w_bot</user_id><url>https://x</url></response>",
            ))
            .mount(&server)
            .await;

        let api = ApiRequest::neu(&server.uri(), "geheim", ShaType::Sha256).unwrap();
        assert!(matches!(
            api.join("demo", "Bot", false).await,
            Err(ApiError::MissingField("auth_token"))
        ));
    }
}
