use std::time::Duration;

use revise_core::auth::{AuthHandshake, AuthSignal, AuthSurface};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::auth::credential_store;
use crate::cli::AuthCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load()?;
    match command {
        AuthCommands::Login { profile, timeout } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let (handshake, surface) = AuthHandshake::new();
            let reader = tokio::spawn(forward_signals(
                BufReader::new(tokio::io::stdin()),
                surface,
            ));

            let credential = handshake.acquire(Duration::from_secs(timeout)).await;
            reader.abort();
            let credential = credential?;

            let label = credential
                .email
                .clone()
                .unwrap_or_else(|| credential.user_id.clone());
            credential_store(&profile_name)?.sign_in(credential)?;
            println!("Signed in profile '{profile_name}' as {label}");
            Ok(())
        }
        AuthCommands::Status { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            match credential_store(&profile_name)?.current() {
                Some(credential) => {
                    let email = credential.email.as_deref().unwrap_or("(no email)");
                    println!(
                        "Profile '{profile_name}' is signed in as {} ({email})",
                        credential.user_id
                    );
                }
                None => println!("Profile '{profile_name}' is not signed in."),
            }
            Ok(())
        }
        AuthCommands::Logout { profile } => {
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            credential_store(&profile_name)?.sign_out()?;
            println!("Signed out profile '{profile_name}'");
            Ok(())
        }
    }
}

/// Feed JSON-line messages from the auth surface into the handshake.
///
/// Unparseable lines become error signals; end of input closes the surface.
pub async fn forward_signals<R>(reader: R, surface: AuthSurface)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => {
                let delivered = match AuthSignal::parse(&line) {
                    Ok(signal) => surface.forward(signal).await,
                    Err(error) => surface.report_error(error.to_string(), "INVALID_MESSAGE").await,
                };
                if !delivered {
                    tracing::debug!("Auth signal not delivered");
                }
            }
            Ok(None) => {
                surface.close().await;
                return;
            }
            Err(error) => {
                surface.report_error(error.to_string(), "READ_ERROR").await;
                return;
            }
        }
    }
}
