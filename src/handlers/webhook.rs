use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Form;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;

use crate::db::queries;
use crate::models::{Appointment, CallSession, SlotState};
use crate::services::export;
use crate::services::turn::CALL_START_SENTINEL;
use crate::state::AppState;
use crate::twiml;

#[derive(Deserialize)]
pub struct IncomingCallForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "CallSid")]
    pub call_sid: String,
}

#[derive(Deserialize)]
pub struct GatherForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: String,
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "To", default)]
    pub to: String,
}

fn validate_twilio_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &[(&str, &str)],
) -> bool {
    // Data to sign: URL + params concatenated in key order
    let mut data = url.to_string();
    let mut sorted_params = params.to_vec();
    sorted_params.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in &sorted_params {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = match Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data.as_bytes());
    let result = mac.finalize().into_bytes();
    let expected = base64::engine::general_purpose::STANDARD.encode(result);

    expected == signature
}

/// Check the X-Twilio-Signature header when an auth token is configured.
/// An empty token means dev mode: validation is skipped.
fn check_signature(
    state: &AppState,
    headers: &HeaderMap,
    path: &str,
    params: &[(&str, &str)],
) -> Result<(), Response> {
    if state.config.twilio_auth_token.is_empty() {
        return Ok(());
    }

    let signature = headers
        .get("x-twilio-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if signature.is_empty() {
        tracing::warn!("missing X-Twilio-Signature header");
        return Err((axum::http::StatusCode::FORBIDDEN, "Missing signature").into_response());
    }

    // Reconstruct webhook URL — use X-Forwarded-Proto/Host if behind proxy
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let url = format!("{proto}://{host}{path}");

    if !validate_twilio_signature(&state.config.twilio_auth_token, signature, &url, params) {
        tracing::warn!("invalid Twilio signature");
        return Err((axum::http::StatusCode::FORBIDDEN, "Invalid signature").into_response());
    }

    Ok(())
}

/// Called by Twilio when a call is answered. Creates the session and asks
/// the first question.
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<IncomingCallForm>,
) -> Response {
    tracing::info!(call_sid = %form.call_sid, from = %form.from, "incoming call");

    let params = [
        ("From", form.from.as_str()),
        ("To", form.to.as_str()),
        ("CallSid", form.call_sid.as_str()),
    ];
    if let Err(resp) = check_signature(&state, &headers, "/voice/incoming", &params) {
        return resp;
    }

    let session = {
        let db = state.db.lock().unwrap();
        let business = match queries::find_or_create_business(&db, &form.to) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "failed to resolve business");
                return apology();
            }
        };

        match queries::get_call_session(&db, &form.call_sid) {
            Ok(Some(session)) => session,
            Ok(None) => CallSession {
                call_sid: form.call_sid.clone(),
                business_id: business.id,
                state: SlotState::default(),
                stage: crate::models::Stage::AskName,
                created_at: Utc::now().naive_utc(),
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to load call session");
                return apology();
            }
        }
    };

    let result = state
        .turns
        .turn(Some(session.state.clone()), CALL_START_SENTINEL)
        .await;

    let updated = CallSession {
        state: result.state,
        stage: result.stage,
        ..session
    };
    {
        let db = state.db.lock().unwrap();
        if let Err(e) = queries::save_call_session(&db, &updated) {
            tracing::error!(error = %e, "failed to save call session");
            return apology();
        }
    }

    xml_response(twiml::gather_speech(
        &result.reply,
        &state.config.gather_action_url(),
    ))
}

/// Called by Twilio after each Gather with the transcribed speech. Runs one
/// turn, persists the updated slots, and finalizes the booking once every
/// slot is filled and confirmed.
pub async fn handle_gather(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<GatherForm>,
) -> Response {
    tracing::info!(call_sid = %form.call_sid, speech = %form.speech_result, "gather result");

    let params = [
        ("CallSid", form.call_sid.as_str()),
        ("SpeechResult", form.speech_result.as_str()),
        ("From", form.from.as_str()),
        ("To", form.to.as_str()),
    ];
    if let Err(resp) = check_signature(&state, &headers, "/voice/gather", &params) {
        return resp;
    }

    let session = {
        let db = state.db.lock().unwrap();
        match queries::get_call_session(&db, &form.call_sid) {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::warn!(call_sid = %form.call_sid, "gather for unknown session");
                return apology();
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load call session");
                return apology();
            }
        }
    };

    let result = state
        .turns
        .turn(Some(session.state.clone()), &form.speech_result)
        .await;

    let updated = CallSession {
        state: result.state.clone(),
        stage: result.stage,
        ..session
    };
    {
        let db = state.db.lock().unwrap();
        if let Err(e) = queries::save_call_session(&db, &updated) {
            tracing::error!(error = %e, "failed to save call session");
            return apology();
        }
    }

    let is_done = result.state.confirmed && result.state.is_complete();
    if !is_done {
        return xml_response(twiml::gather_speech(
            &result.reply,
            &state.config.gather_action_url(),
        ));
    }

    let appt = Appointment {
        id: uuid::Uuid::new_v4().to_string(),
        business_id: updated.business_id,
        customer_name: result.state.name.clone().unwrap_or_default(),
        service_type: result.state.service_type.clone().unwrap_or_default(),
        date_time_str: result.state.date_time.clone().unwrap_or_default(),
        phone_number: result.state.phone.clone().unwrap_or_default(),
        notes: None,
        created_at: Utc::now().naive_utc(),
    };

    {
        let db = state.db.lock().unwrap();
        if let Err(e) = queries::create_appointment(&db, &appt) {
            tracing::error!(error = %e, call_sid = %form.call_sid, "failed to save appointment");
            return apology();
        }
    }

    // Export failure must not fail the call; the booking row is durable.
    if let Err(e) = export::append_appointment(&state.config.export_dir, &appt) {
        tracing::error!(error = %e, "failed to append appointment to spreadsheet");
    }

    tracing::info!(
        call_sid = %form.call_sid,
        appointment_id = %appt.id,
        "appointment booked"
    );

    xml_response(twiml::say_and_hangup(&[
        result.reply.as_str(),
        "Thank you. Your appointment has been recorded. Goodbye.",
    ]))
}

fn apology() -> Response {
    xml_response(twiml::say_and_hangup(&[
        "Sorry, something went wrong. Goodbye.",
    ]))
}

fn xml_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}
