//! Authentication CLI command handlers

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use secrecy::SecretString;

use crate::cli::commands::AuthCommand;
use crate::cli::context::{build_client, CliNavigator};
use crate::core::config::Config;
use crate::core::credentials::mask_token;
use crate::error::{LookbookError, Result};

/// Handle authentication commands
pub async fn handle_auth(command: AuthCommand) -> Result<()> {
    match command {
        AuthCommand::Login {
            username,
            password_stdin,
        } => handle_login(username, password_stdin).await,
        AuthCommand::Logout => handle_logout(),
        AuthCommand::Status => handle_status(),
        AuthCommand::Refresh => handle_refresh().await,
    }
}

/// Handle the login command
async fn handle_login(username: Option<String>, password_stdin: bool) -> Result<()> {
    let config = Config::load()?;
    let client = build_client(&config, Arc::new(CliNavigator::new(true)))?;

    // Check if already authenticated
    if client.session().is_authenticated() {
        println!("✓ Already logged in.");
        println!();
        println!("  To log in as someone else, first run: lookbook auth logout");
        return Ok(());
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock();

    let username = match username {
        Some(name) => name,
        None => prompt(&mut lines, "Username: ")?,
    };
    let password = if password_stdin {
        read_line(&mut lines)?
    } else {
        prompt(&mut lines, "Password: ")?
    };

    if username.is_empty() || password.is_empty() {
        return Err(LookbookError::InvalidInput(
            "Username and password are required".to_string(),
        ));
    }

    client
        .auth()
        .login(&username, &SecretString::from(password))
        .await?;

    println!("\n✓ Logged in as {}.", username);
    println!("  Token store: {}", config.token_store);
    Ok(())
}

/// Handle the logout command
fn handle_logout() -> Result<()> {
    let config = Config::load()?;
    let client = build_client(&config, Arc::new(CliNavigator::new(false)))?;

    match client.auth().logout() {
        Ok(()) => {
            println!("Successfully logged out.");
            Ok(())
        }
        Err(LookbookError::NotAuthenticated) => {
            println!("Not currently logged in.");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Handle the status command
fn handle_status() -> Result<()> {
    let config = Config::load()?;
    let client = build_client(&config, Arc::new(CliNavigator::new(false)))?;
    let state = client.session().snapshot();

    println!("Authentication Status:");
    println!(
        "  Session: {}",
        if state.is_authenticated {
            "Logged in"
        } else {
            "Not logged in"
        }
    );
    println!("  API: {}", config.api_base_url);
    println!("  Token store: {}", config.token_store);

    if let Some(token) = state.access_token() {
        println!("\n  Access token: {}", mask_token(token));
        match state.refresh_token() {
            Some(refresh) => println!("  Refresh token: {}", mask_token(refresh)),
            None => println!("  Refresh token: none (re-login required when the access token expires)"),
        }
    }

    Ok(())
}

/// Handle the refresh command
async fn handle_refresh() -> Result<()> {
    let config = Config::load()?;
    let client = build_client(&config, Arc::new(CliNavigator::new(false)))?;

    if !client.session().is_authenticated() {
        return Err(LookbookError::NotAuthenticated);
    }

    let token = client.tokens().refresh_access_token().await?;
    println!("✓ Access token refreshed: {}", mask_token(&token));
    Ok(())
}

/// Print a prompt and read one trimmed line
fn prompt(input: &mut impl BufRead, label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    read_line(input)
}

fn read_line(input: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
