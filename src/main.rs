//! Amber CLI entry point

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use anyhow::Result;
use colored::*;
use amber::auth::{AuthService, Session};
use amber::content::{TextContent, TextLibrary};
use amber::ui;

#[derive(Parser)]
#[command(name = "amber")]
#[command(about = "Amber - per-user text storage behind a user pool sign-in")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write ~/.amber/config.json
    Onboard,

    /// Sign in with email and password
    Signin {
        /// Account email (the user pool username)
        #[arg(short, long)]
        email: String,
    },

    /// Sign in through the hosted UI in a browser
    Browser,

    /// Complete a browser sign-in from a redirect URL
    Redirect {
        /// The full callback URL, e.g. amber-app://auth/callback/signin?code=...
        url: String,
    },

    /// Show the configured pools and bucket
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard => {
            amber::config::onboard()?;
        }

        Commands::Signin { email } => {
            let service = AuthService::from_config(amber::config::load()?)?;
            let password = inquire::Password::new("Password:")
                .without_confirmation()
                .prompt()?;

            let spinner = ui::spinner("Signing in");
            let result = service.sign_in(&email, &password).await;
            spinner.finish_and_clear();

            run_shell(&service, result?).await?;
        }

        Commands::Browser => {
            let service = AuthService::from_config(amber::config::load()?)?;
            let url = service.gateway().authorization_url()?;

            ui::print_step(&format!("Opening {}", url));
            if let Err(e) = open::that(&url) {
                ui::print_warning(&format!("Could not open a browser ({}). Open the URL above manually.", e));
            }

            let redirect = inquire::Text::new("Redirect URL:")
                .with_help_message("paste the URL the browser was sent to after sign-in")
                .prompt()?;
            complete_redirect(&service, redirect.trim()).await?;
        }

        Commands::Redirect { url } => {
            let service = AuthService::from_config(amber::config::load()?)?;
            complete_redirect(&service, &url).await?;
        }

        Commands::Status => {
            let config = amber::config::load()?;
            ui::print_header("Status");
            println!("Config: {}", amber::config::config_path().display());
            println!("Region: {}", config.region);
            println!("User pool: {}", config.user_pool_id);
            println!("Identity pool: {}", config.identity_pool_id);
            println!("Bucket: {}", config.bucket);
            println!("Redirect: {}", config.signin_redirect_url);
            if let Some(endpoint) = &config.endpoints.storage {
                println!("Storage endpoint: {}", endpoint);
            }
        }
    }

    Ok(())
}

async fn complete_redirect(service: &AuthService, url: &str) -> Result<()> {
    let spinner = ui::spinner("Exchanging authorization code");
    let result = service.redirect_handler().handle(url).await;
    spinner.finish_and_clear();

    match result? {
        Some(session) => run_shell(service, session).await,
        None => {
            ui::print_warning("Not a sign-in callback URL (or no code in it); nothing to do.");
            Ok(())
        }
    }
}

/// Resolve a shell argument to an object key: bare names live in the home prefix.
fn object_key(session: &Session, name: &str) -> String {
    if name.contains('/') {
        name.to_string()
    } else {
        format!("{}{}", session.home_prefix(), name)
    }
}

async fn run_shell(service: &AuthService, session: Session) -> Result<()> {
    use std::io::{self, Write};

    let library = TextLibrary::from_config(service.config());

    ui::print_success(&format!("Signed in as {}", session.email()));
    println!("  Commands: ls, new [text], cat <name>, save <name> <text>, rm <name>, get <key>, whoami, signout, exit\n");

    loop {
        print!("{} ", "amber>".yellow().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let (command, rest) = input.split_once(' ').unwrap_or((input, ""));
        let rest = rest.trim();

        let outcome = match command {
            "exit" | "quit" => break,
            "signout" => match service.sign_out(&session).await {
                Ok(()) => {
                    ui::print_success("Signed out");
                    break;
                }
                Err(e) => Err(e),
            },
            "whoami" => {
                let token = session.token().await;
                println!("  Email: {}", session.email());
                println!("  Identity: {}", session.identity_id());
                println!("  Expires: {}", token.expires_at().to_rfc3339());
                println!("  Status: {:?}", session.status());
                Ok(())
            }
            "ls" => library.list(&session).await.map(|objects| {
                if objects.is_empty() {
                    ui::print_step("No text contents yet. Try 'new'.");
                }
                for object in objects {
                    println!(
                        "  {}  {}  {}",
                        object.last_modified.format("%Y-%m-%d %H:%M:%S").to_string().black().bold(),
                        hex::encode(&object.hash).black().bold(),
                        object.filename()
                    );
                }
            }),
            "new" => {
                let created = if rest.is_empty() {
                    library.create_sample(&session).await
                } else {
                    library.create(&session, rest).await
                };
                created.map(|object| ui::print_success(&format!("Created {}", object.filename())))
            }
            "cat" if !rest.is_empty() => library
                .load(&session, &object_key(&session, rest))
                .await
                .map(|content| println!("{}", content.text)),
            "save" => match rest.split_once(' ') {
                Some((name, text)) => {
                    let content = TextContent::new(object_key(&session, name), text.trim());
                    library
                        .save(&session, &content)
                        .await
                        .map(|()| ui::print_success(&format!("Saved {}", name)))
                }
                None => {
                    ui::print_warning("Usage: save <name> <text>");
                    Ok(())
                }
            },
            "rm" if !rest.is_empty() => library
                .delete(&session, &object_key(&session, rest))
                .await
                .map(|()| ui::print_success(&format!("Deleted {}", rest))),
            "get" if !rest.is_empty() => library.fetch_text(&session, rest).await.map(|text| match text {
                Some(text) => println!("{}", text),
                None => ui::print_warning("Object is not UTF-8 text"),
            }),
            _ => {
                ui::print_warning(&format!("Unknown command: {}", input));
                Ok(())
            }
        };

        if let Err(e) = outcome {
            ui::print_error(&e.to_string());
            if e.is_authentication() {
                ui::print_warning("Please sign in again.");
                break;
            }
        }
    }

    Ok(())
}
