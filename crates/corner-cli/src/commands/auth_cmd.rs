use chrono::DateTime;
use corner_core::auth::{AuthSession, SignUpOutcome, SignUpProfile};
use corner_core::util::normalize_text_option;

use crate::auth::sync_user_profile;
use crate::cli::AuthCommands;
use crate::commands::common::App;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, app: &mut App) -> Result<(), CliError> {
    match command {
        AuthCommands::SignIn { email, password } => {
            let session = app.auth()?.sign_in(&email, &password).await?;
            let name = session.user.display_name();
            sync_profile_best_effort(app, &session).await;
            app.sign_in(session);
            println!("Signed in as {name}");
        }
        AuthCommands::SignUp {
            email,
            password,
            username,
            first_name,
            last_name,
        } => {
            let profile = SignUpProfile {
                username: normalize_text_option(username),
                first_name: normalize_text_option(first_name),
                last_name: normalize_text_option(last_name),
            };
            match app.auth()?.sign_up(&email, &password, &profile).await? {
                SignUpOutcome::SignedIn(session) => {
                    let name = session.user.display_name();
                    sync_profile_best_effort(app, &session).await;
                    app.sign_in(session);
                    println!("Account created, signed in as {name}");
                }
                SignUpOutcome::ConfirmationRequired => {
                    println!(
                        "Account created. Confirm your email, then run `corner auth sign-in`."
                    );
                }
            }
        }
        AuthCommands::Status => match app.session.session() {
            Some(session) => println!("{}", status_line(session)),
            None => println!("Not signed in."),
        },
        AuthCommands::SignOut => {
            let access_token = app.session.access_token().ok().map(str::to_string);
            let auth = app.auth()?;
            match access_token {
                Some(token) => auth.sign_out(&token).await?,
                None => auth.forget()?,
            }
            app.sign_out();
            println!("Signed out");
        }
    }
    Ok(())
}

/// The profile row is a convenience copy; failing to write it never blocks sign-in.
async fn sync_profile_best_effort(app: &App, session: &AuthSession) {
    if let Err(error) = sync_user_profile(&app.config.api_base_url, session).await {
        tracing::warn!("{}", error);
    }
}

pub fn status_line(session: &AuthSession) -> String {
    let email = session.user.email.as_deref().unwrap_or("(no email)");
    let expires = DateTime::from_timestamp(session.expires_at, 0)
        .map_or_else(|| session.expires_at.to_string(), |at| at.to_rfc3339());
    format!(
        "Signed in as {} <{email}> (session expires {expires})",
        session.user.display_name()
    )
}
