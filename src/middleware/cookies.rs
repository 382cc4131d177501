use axum::http::HeaderValue;
use axum::http::header::{HeaderName, SET_COOKIE};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::session::{CookieInstruction, RedirectInstruction};

/// Build the cookie described by `instruction`.
pub(super) fn build_cookie(instruction: &CookieInstruction) -> Cookie<'static> {
    Cookie::build((instruction.name.clone(), instruction.value.clone()))
        .http_only(instruction.http_only)
        .secure(instruction.secure)
        .same_site(SameSite::Lax)
        .path(instruction.path.clone())
        .max_age(instruction.max_age)
        .expires(instruction.expires)
        .build()
}

/// Turn a redirect instruction into a response.
///
/// Session cookies go through the private jar (encrypted). Removal cookies
/// are written as plain `Set-Cookie` headers: the jar only emits a removal
/// for cookies it saw on the request and would encrypt the empty value.
pub(super) fn redirect_response(jar: PrivateCookieJar, instruction: RedirectInstruction) -> Response {
    let mut jar = jar;
    let mut removals: Vec<(HeaderName, HeaderValue)> = Vec::new();

    for cookie in &instruction.cookies {
        if cookie.is_removal() {
            match HeaderValue::from_str(&build_cookie(cookie).to_string()) {
                Ok(value) => removals.push((SET_COOKIE, value)),
                Err(e) => tracing::error!(error = %e, cookie = %cookie.name, "Unencodable removal cookie"),
            }
        } else {
            jar = jar.add(build_cookie(cookie));
        }
    }

    (jar, AppendHeaders(removals), Redirect::to(instruction.target.as_str())).into_response()
}
