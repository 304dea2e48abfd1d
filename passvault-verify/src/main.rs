//! PassVault Verification Server
//!
//! Issues one-time codes that prove a user owns the e-mail address they
//! register with during master password setup.
//!
//! # Protocol
//!
//! - `POST /send-code {email}` mails a six-digit code through the SMTP
//!   relay given by `--smtp-host`, or only logs it when no relay is set
//! - `POST /verify-code {email, code}` consumes it
//!
//! Codes expire after `--code-ttl-secs` and are held in memory only, so a
//! restart invalidates every pending code.

mod codes;
mod mailer;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{TimeDelta, Utc};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use codes::{CodeCheck, CodeStore};
use mailer::{build_mailer, Mailer, SmtpArgs};

/// How often expired codes are swept from memory.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// PassVault Verification Server
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Port for the HTTP API
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Seconds a verification code stays valid
    #[arg(long, default_value = "600")]
    code_ttl_secs: u32,

    #[command(flatten)]
    smtp: SmtpArgs,
}

#[derive(Clone)]
struct ServiceState {
    codes: Arc<CodeStore>,
    mailer: Arc<dyn Mailer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SendCodeRequest {
    email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VerifyCodeRequest {
    email: String,
    code: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("passvault_verify=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!("Starting PassVault Verification Server");
    info!("HTTP port: {}", args.port);
    info!("Code validity: {}s", args.code_ttl_secs);

    let state = ServiceState {
        codes: Arc::new(CodeStore::new(TimeDelta::seconds(i64::from(
            args.code_ttl_secs,
        )))),
        mailer: build_mailer(&args.smtp)?,
    };

    let codes = state.codes.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            codes.sweep(Utc::now()).await;
        }
    });

    let addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Verification server listening on {}", addr);
    axum::serve(listener, router(state))
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/send-code", post(send_code))
        .route("/verify-code", post(verify_code))
        .route(
            "/health",
            get(|| async { Json(json!({"status": "healthy"})) }),
        )
        .with_state(state)
}

async fn send_code(
    State(state): State<ServiceState>,
    Json(body): Json<SendCodeRequest>,
) -> (StatusCode, Json<Value>) {
    let email = body.email.trim();
    if email.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Email is required"})),
        );
    }

    let code = state.codes.issue(email, Utc::now()).await;
    let valid_minutes = state.codes.ttl().num_minutes();

    match state.mailer.send_code(email, &code, valid_minutes).await {
        Ok(()) => {
            info!("Code sent to {}", email);
            (
                StatusCode::OK,
                Json(json!({"success": true, "message": "Code sent"})),
            )
        }
        Err(e) => {
            warn!("Failed to deliver code to {}: {:#}", email, e);
            state.codes.revoke(email).await;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to send e-mail"})),
            )
        }
    }
}

async fn verify_code(
    State(state): State<ServiceState>,
    Json(body): Json<VerifyCodeRequest>,
) -> (StatusCode, Json<Value>) {
    let email = body.email.trim();
    let result = state.codes.check(email, body.code.trim(), Utc::now()).await;

    let (status, valid, message) = match result {
        CodeCheck::Valid => (StatusCode::OK, true, "Email verified"),
        CodeCheck::Missing => (
            StatusCode::BAD_REQUEST,
            false,
            "No code was requested for this email",
        ),
        CodeCheck::Expired => (
            StatusCode::BAD_REQUEST,
            false,
            "Code expired. Request a new one.",
        ),
        CodeCheck::Wrong => (StatusCode::BAD_REQUEST, false, "Incorrect code"),
    };

    if valid {
        info!("Verified {}", email);
    } else {
        warn!("Verification failed for {}: {:?}", email, result);
    }
    (status, Json(json!({"valid": valid, "message": message})))
}
