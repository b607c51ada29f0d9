//! Credential collection over the token session

use tps_apdu_core::{
    BeginOp, Message, Session,
    session::{ExtendedLoginRequest, Fields},
};
use tracing::{debug, info};

use super::{AuthError, AuthToken, Authenticator, Credentials, UiParameter};

/// Ask the client for credentials
///
/// Clients announcing extended login get the authenticator's localized
/// parameter set; others get a plain login request.
pub fn collect_credentials<S: Session + ?Sized>(
    session: &mut S,
    begin: &BeginOp,
    authenticator: &Authenticator,
) -> Result<Credentials, AuthError> {
    if begin.wants_extended_login() {
        let locale = begin.locale();
        let request = ExtendedLoginRequest {
            invalid_pw: 0,
            blocked: 0,
            title: authenticator.title(locale).to_string(),
            description: authenticator.description(locale).to_string(),
            parameters: authenticator.params.iter().map(|param| param.render(locale)).collect(),
        };
        debug!(authenticator = %authenticator.id, locale, "Sending extended login request");
        match session.exchange(Message::ExtendedLoginRequest(request))? {
            Message::ExtendedLoginResponse(fields) => {
                map_credentials(&authenticator.params, &fields, |param| &param.cred_map.ext_login)
            }
            other => Err(AuthError::UnexpectedMessage {
                expected: "ExtendedLoginResponse",
                actual: other.name(),
            }),
        }
    } else {
        debug!(authenticator = %authenticator.id, "Sending login request");
        match session.exchange(Message::LoginRequest {
            invalid_pw: 0,
            blocked: 0,
        })? {
            Message::LoginResponse(fields) => {
                map_credentials(&authenticator.params, &fields, |param| &param.cred_map.login)
            }
            other => Err(AuthError::UnexpectedMessage {
                expected: "LoginResponse",
                actual: other.name(),
            }),
        }
    }
}

/// Collect credentials and check them with the authenticator's backend
pub fn authenticate<S: Session + ?Sized>(
    session: &mut S,
    begin: &BeginOp,
    authenticator: &Authenticator,
) -> Result<AuthToken, AuthError> {
    let credentials = collect_credentials(session, begin, authenticator)?;
    let token = authenticator.backend.authenticate(&credentials)?;
    info!(authenticator = %authenticator.id, user = token.user_id(), "Authenticated");
    Ok(token)
}

fn map_credentials(
    params: &[UiParameter],
    fields: &Fields,
    message_name: impl Fn(&UiParameter) -> &String,
) -> Result<Credentials, AuthError> {
    let mut credentials = Credentials::new();
    for param in params {
        let value = fields
            .get(message_name(param))
            .ok_or_else(|| AuthError::MissingCredential(param.id.clone()))?;
        credentials.insert(param.cred_map.auth_cred.clone(), value.clone());
    }
    Ok(credentials)
}
