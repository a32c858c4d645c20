//! Public signing endpoints reached through the link emailed to a driver

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};

use shared::template::escape_html;
use shared::AgreementStatus;

use crate::error::AppError;
use crate::middleware::ClientInfo;
use crate::services::agreement::{SignInput, SigningView};
use crate::services::{Actor, AgreementService};
use crate::AppState;

fn service(state: &AppState) -> AgreementService {
    AgreementService::new(state.db.clone(), &state.config, state.storage.clone())
}

/// Agreement behind a signing link, as JSON
pub async fn get_signing_view(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SigningView>, AppError> {
    let view = service(&state).get_signing_view(&token).await?;
    Ok(Json(view))
}

/// Sign the agreement behind a link
pub async fn sign_agreement(
    State(state): State<AppState>,
    client: ClientInfo,
    Path(token): Path<String>,
    Json(input): Json<SignInput>,
) -> Result<Json<SigningView>, AppError> {
    let actor = Actor::anonymous(client.ip.clone());
    let view = service(&state)
        .sign(&actor, client.user_agent.as_deref(), &token, input)
        .await?;
    Ok(Json(view))
}

/// Browser page for reviewing and signing an agreement
pub async fn render_signing_page(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Response {
    match service(&state).get_signing_view(&token).await {
        Ok(view) => Html(signing_page(&token, &view)).into_response(),
        Err(AppError::NotFound(_)) => message_page(
            StatusCode::NOT_FOUND,
            "Link not found",
            "This signing link is not valid. Please check the link in your email.",
        ),
        Err(AppError::Gone(message)) => message_page(
            StatusCode::GONE,
            "Link no longer valid",
            &format!("{}. Please ask your fleet contact for a new link.", message),
        ),
        Err(err) => err.into_response(),
    }
}

const PAGE_STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:760px;margin:2rem auto;padding:0 1rem;color:#222}\
pre{white-space:pre-wrap;font-family:inherit;background:#f7f7f7;padding:1rem;border:1px solid #ddd}\
canvas{border:1px solid #888;touch-action:none;background:#fff}\
.meta td{padding:.2rem 1rem .2rem 0}.error{color:#b00020}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>{title}</title><style>{style}</style></head><body>{body}</body></html>",
        title = escape_html(title),
        style = PAGE_STYLE,
        body = body
    )
}

fn message_page(status: StatusCode, title: &str, message: &str) -> Response {
    let body = format!(
        "<h1>{}</h1><p>{}</p>",
        escape_html(title),
        escape_html(message)
    );
    (status, Html(page(title, &body))).into_response()
}

fn summary_table(view: &SigningView) -> String {
    let end_date = view
        .end_date
        .map(|d| d.format("%d %B %Y").to_string())
        .unwrap_or_else(|| "Open-ended".to_string());
    format!(
        "<table class=\"meta\">\
<tr><td>Driver</td><td>{}</td></tr>\
<tr><td>Vehicle</td><td>{} ({})</td></tr>\
<tr><td>Start</td><td>{}</td></tr>\
<tr><td>End</td><td>{}</td></tr>\
<tr><td>Weekly rate</td><td>{:.2}</td></tr>\
<tr><td>Deposit</td><td>{:.2}</td></tr></table>",
        escape_html(&view.driver_name),
        escape_html(&view.vehicle_registration),
        escape_html(&view.vehicle_description),
        view.start_date.format("%d %B %Y"),
        end_date,
        view.weekly_rate,
        view.deposit,
    )
}

const SIGNING_SCRIPT: &str = r#"<script>
(function () {
  var form = document.getElementById('sign-form');
  var canvas = document.getElementById('pad');
  var ctx = canvas.getContext('2d');
  var drawing = false, drawn = false;
  ctx.lineWidth = 2; ctx.lineCap = 'round';
  function pos(e) { var r = canvas.getBoundingClientRect(); return { x: e.clientX - r.left, y: e.clientY - r.top }; }
  canvas.addEventListener('pointerdown', function (e) { drawing = true; var p = pos(e); ctx.beginPath(); ctx.moveTo(p.x, p.y); });
  canvas.addEventListener('pointermove', function (e) { if (!drawing) return; var p = pos(e); ctx.lineTo(p.x, p.y); ctx.stroke(); drawn = true; });
  window.addEventListener('pointerup', function () { drawing = false; });
  document.getElementById('clear').addEventListener('click', function () { ctx.clearRect(0, 0, canvas.width, canvas.height); drawn = false; });
  form.addEventListener('submit', function (e) {
    e.preventDefault();
    var error = document.getElementById('error');
    if (!drawn) { error.textContent = 'Please draw your signature.'; return; }
    fetch('/api/v1/sign/' + encodeURIComponent(form.dataset.token), {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({
        signer_name: form.signer_name.value,
        accepted_terms: form.accepted_terms.checked,
        signature_data: canvas.toDataURL('image/png')
      })
    }).then(function (res) {
      if (res.ok) { window.location.reload(); return; }
      return res.json().then(function (body) { error.textContent = body.error.message; });
    }).catch(function () { error.textContent = 'Could not reach the server. Please try again.'; });
  });
})();
</script>"#;

/// HTML for a signing link in its current state
fn signing_page(token: &str, view: &SigningView) -> String {
    let title = format!("Rental agreement {}", view.agreement_number);
    let mut body = format!(
        "<h1>{}</h1>{}<h2>Terms</h2><pre>{}</pre>",
        escape_html(&title),
        summary_table(view),
        escape_html(&view.content)
    );

    if view.status == AgreementStatus::Signed.as_str() {
        let signed_at = view
            .signed_at
            .map(|t| t.format("%d %B %Y %H:%M UTC").to_string())
            .unwrap_or_default();
        body.push_str(&format!(
            "<p><strong>Signed by {} on {}.</strong> You can close this page.</p>",
            escape_html(view.signer_name.as_deref().unwrap_or_default()),
            signed_at
        ));
    } else {
        let expires = view
            .expires_at
            .map(|t| t.format("%d %B %Y %H:%M UTC").to_string())
            .unwrap_or_default();
        body.push_str(&format!(
            "<h2>Sign</h2><p>This link expires on {}.</p>\
<form id=\"sign-form\" data-token=\"{}\">\
<p><label>Full name<br><input name=\"signer_name\" required maxlength=\"200\"></label></p>\
<p><canvas id=\"pad\" width=\"500\" height=\"160\"></canvas><br>\
<button type=\"button\" id=\"clear\">Clear</button></p>\
<p><label><input type=\"checkbox\" name=\"accepted_terms\"> I have read and accept the terms above</label></p>\
<p class=\"error\" id=\"error\"></p>\
<button type=\"submit\">Sign agreement</button></form>{}",
            expires,
            escape_html(token),
            SIGNING_SCRIPT
        ));
    }

    page(&title, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn view(status: AgreementStatus) -> SigningView {
        SigningView {
            agreement_id: Uuid::new_v4(),
            agreement_number: "AGR-2026-00001".to_string(),
            status: status.as_str().to_string(),
            driver_name: "Sam <Driver>".to_string(),
            vehicle_registration: "AB12CDE".to_string(),
            vehicle_description: "Toyota Prius".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            end_date: None,
            weekly_rate: Decimal::new(25000, 2),
            deposit: Decimal::new(50000, 2),
            content: "Terms & conditions".to_string(),
            expires_at: Some(Utc.with_ymd_and_hms(2026, 10, 26, 9, 0, 0).unwrap()),
            signed_at: None,
            signer_name: None,
        }
    }

    #[test]
    fn test_pending_page_has_form_and_escapes() {
        let html = signing_page("tok\"en", &view(AgreementStatus::PendingSignature));
        assert!(html.contains("id=\"sign-form\""));
        assert!(html.contains("data-token=\"tok&quot;en\""));
        assert!(html.contains("Sam &lt;Driver&gt;"));
        assert!(html.contains("Terms &amp; conditions"));
        assert!(html.contains("250.00"));
        assert!(html.contains("Open-ended"));
    }

    #[test]
    fn test_signed_page_has_no_form() {
        let mut signed = view(AgreementStatus::Signed);
        signed.signer_name = Some("Sam Driver".to_string());
        signed.signed_at = Some(Utc.with_ymd_and_hms(2026, 10, 20, 8, 15, 0).unwrap());

        let html = signing_page("token", &signed);
        assert!(!html.contains("sign-form"));
        assert!(html.contains("Signed by Sam Driver on 20 October 2026 08:15 UTC"));
    }

    #[test]
    fn test_message_page_status() {
        let response = message_page(StatusCode::GONE, "Expired", "Gone");
        assert_eq!(response.status(), StatusCode::GONE);
    }
}
