use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use frontdoor_auth::{
    CallbackParams, SessionId,
    middleware::{LOGIN_PATH, Principal, found},
};
use serde::Deserialize;

use crate::server::AppState;

const HOME_PATH: &str = "/home";
pub const AUTHORIZE_PATH: &str = "/oauth2/authorize";

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    error: Option<String>,
}

pub async fn root() -> Response {
    found(LOGIN_PATH)
}

/// Renders the login page. The flow itself starts at `/oauth2/authorize`,
/// so fetching this page never disturbs a login already in flight.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    let (jar, _session) = ensure_session(&state, jar);
    (jar, Html(render_login_page(query.error.as_deref()))).into_response()
}

/// Starts a login and redirects straight to the authorization server.
pub async fn authorize(State(state): State<AppState>, jar: CookieJar) -> Response {
    let (jar, session) = ensure_session(&state, jar);

    match state.flow.begin_login(&session).await {
        Ok(url) => (jar, found(url.as_str())).into_response(),
        Err(e) => internal_error(&session, &e),
    }
}

/// Redirect target of the authorization server.
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(session) = state.cookie.session_id(&jar) else {
        tracing::warn!("Login callback without a session cookie");
        return login_error("invalid_state");
    };

    match state.flow.complete_callback(&session, params).await {
        Ok(_) => found(HOME_PATH),
        Err(e) => login_error(e.user_error_code()),
    }
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(session) = state.cookie.session_id(&jar) {
        if let Err(e) = state.flow.logout(&session).await {
            return internal_error(&session, &e);
        }
    }
    (state.cookie.clear(jar), found(LOGIN_PATH)).into_response()
}

pub async fn home(Principal(user): Principal) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html><head><title>Home</title></head><body>\
         <h1>Hello, {}!</h1>\
         <form method=\"post\" action=\"/logout\"><button type=\"submit\">Log out</button></form>\
         </body></html>",
        escape_html(&user.username)
    ))
}

// ---- helpers ----

/// Returns the request's session, issuing a new cookie if it has none.
fn ensure_session(state: &AppState, jar: CookieJar) -> (CookieJar, SessionId) {
    match state.cookie.session_id(&jar) {
        Some(session) => (jar, session),
        None => {
            let session = SessionId::generate();
            let jar = jar.add(state.cookie.build(&session));
            (jar, session)
        }
    }
}

fn login_error(code: &str) -> Response {
    found(&format!("{LOGIN_PATH}?error={code}"))
}

fn internal_error(session: &SessionId, err: &frontdoor_auth::AuthError) -> Response {
    tracing::error!(
        session = %session.log_id(),
        category = %err.category(),
        error = %err,
        "Login flow failed"
    );
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn render_login_page(error: Option<&str>) -> String {
    let error = error
        .filter(|e| !e.is_empty())
        .map(|e| {
            format!(
                "<p class=\"error\">Login failed: <code>{}</code></p>",
                escape_html(e)
            )
        })
        .unwrap_or_default();

    format!(
        "<!DOCTYPE html>\n<html><head><title>Log in</title></head><body>\
         <h1>Log in</h1>{error}\
         <form method=\"post\" action=\"{AUTHORIZE_PATH}\">\
         <button type=\"submit\">Log in with your identity provider</button></form>\
         </body></html>"
    )
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
