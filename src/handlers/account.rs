use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::accounts::{self, Signup};
use crate::error::Result;
use crate::handlers::extract::Payload;
use crate::state::AppState;

// Fields are optional at the serde level so that an absent field and an
// empty one both end up as a MissingField error rather than a parse error.
#[derive(Deserialize)]
pub(crate) struct SignupForm {
    fullname: Option<String>,
    nidn: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct SigninForm {
    username: Option<String>,
    password: Option<String>,
}

pub(crate) async fn signup(
    State(state): State<AppState>,
    Payload(form): Payload<SignupForm>,
) -> Result<(StatusCode, Json<Value>)> {
    let signup = Signup {
        fullname: form.fullname.unwrap_or_default(),
        nidn: form.nidn.unwrap_or_default(),
        username: form.username.unwrap_or_default(),
        password: form.password.unwrap_or_default(),
    };
    let user = accounts::signup(&state.db, &state.hasher, signup).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Registration successful", "user": user })),
    ))
}

pub(crate) async fn signin(
    State(state): State<AppState>,
    Payload(form): Payload<SigninForm>,
) -> Result<Json<Value>> {
    let username = form.username.unwrap_or_default();
    let password = form.password.unwrap_or_default();
    let token =
        accounts::signin(&state.db, &state.hasher, &state.tokens, &username, &password).await?;

    Ok(Json(json!({ "message": "Login successful", "token": token })))
}
