use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::debug;

use crate::{
    api::{ApiError, FollowStats, ProfileUpdate, User},
    app::{init_config, AppState},
    auth::{expires_at, CredentialsForm, CredentialsMode, FormErrors},
    constants::SIGNUP_SUCCESS_MESSAGE,
    profile::ProfileDraft,
    routing::ViewAccess,
};

use super::{Commands, OutputFormat, PasswordArg};

/// Handle CLI subcommands. Returns false when the command failed and the
/// process should exit non-zero.
pub async fn handle_command(command: &Commands, state: &AppState, format: OutputFormat) -> Result<bool> {
    match command {
        Commands::Init => {
            println!("Initializing Plaza configuration...");
            match init_config()? {
                Some(path) => println!("Created default configuration at: {}", path.display()),
                None => println!("Configuration already exists"),
            }
            Ok(true)
        }
        Commands::Signup { username, password, login } => {
            signup(state, username, password, *login).await
        }
        Commands::Login { username, password } => login(state, username, password).await,
        Commands::Logout => {
            state.session.logout();
            println!("Logged out");
            Ok(true)
        }
        Commands::Status => {
            show_status(state, format);
            Ok(true)
        }
        Commands::Me => {
            let Some(_) = require_user(state) else {
                return Ok(false);
            };
            match state.profiles.get_me().await {
                Ok(user) => {
                    print_user(&user, None, format)?;
                    Ok(true)
                }
                Err(err) => Ok(report(&err)),
            }
        }
        Commands::Edit { display_name, bio, photo } => {
            edit_profile(state, display_name.as_deref(), bio.as_deref(), photo.as_deref(), format).await
        }
        Commands::DeletePhoto => delete_photo(state).await,
        Commands::User { username } => {
            let user = match state.profiles.get_user_by_username(username).await {
                Ok(user) => user,
                Err(err) => return Ok(report(&err)),
            };
            let controller = state.relationship();
            let stats = controller.bind(user.id).await.ok();
            print_user(&user, stats, format)?;
            Ok(true)
        }
        Commands::Stats { username } => {
            let user = match state.profiles.get_user_by_username(username).await {
                Ok(user) => user,
                Err(err) => return Ok(report(&err)),
            };
            match state.relationship().bind(user.id).await {
                Ok(stats) => {
                    print_stats(&user, &stats, format)?;
                    Ok(true)
                }
                Err(err) => Ok(report(&err)),
            }
        }
        Commands::Follow { username } => change_relationship(state, username, true, format).await,
        Commands::Unfollow { username } => change_relationship(state, username, false, format).await,
        Commands::Watch => watch(state).await,
        Commands::Version => {
            show_version();
            Ok(true)
        }
    }
}

/// Show version information
pub fn show_version() {
    println!("Plaza v{}", env!("CARGO_PKG_VERSION"));
    println!("   A terminal client for the Plaza social network");
}

fn resolve_password(arg: &PasswordArg) -> Result<String> {
    if let Some(password) = &arg.password {
        return Ok(password.clone());
    }

    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_form_errors(errors: &FormErrors) {
    if let Some(global) = errors.global() {
        eprintln!("{} {}", "[ERROR]".red(), global);
    }
    for (field, message) in errors.fields() {
        eprintln!("{} {}: {}", "[ERROR]".red(), field.bold(), message);
    }
}

/// Print a failed operation; always false so callers can return it
fn report(err: &ApiError) -> bool {
    match err.field.as_deref() {
        Some(field) => eprintln!("{} {}: {}", "[ERROR]".red(), field.bold(), err.message),
        None => eprintln!("{} {}", "[ERROR]".red(), err.message),
    }
    debug!(kind = ?err.kind, status = err.status, "Command failed");
    false
}

/// Resolve the signed-in user through the route guard
fn require_user(state: &AppState) -> Option<User> {
    match state.guard.check() {
        ViewAccess::Granted(user) => Some(user),
        ViewAccess::Loading => {
            eprintln!("{} Session is still loading", "[WARNING]".yellow());
            None
        }
        ViewAccess::Redirect { to, message } => {
            if let Some(message) = message {
                eprintln!("{} {}", "[WARNING]".yellow(), message);
            }
            eprintln!("Not logged in ({}). Run: {}", to, "plaza login <username>".cyan());
            None
        }
    }
}

/// Validate and send a credentials form, printing any errors
async fn submit_credentials(state: &AppState, form: &mut CredentialsForm) -> Option<Submitted> {
    if !form.validate() {
        print_form_errors(form.errors());
        return None;
    }
    if !form.begin_submit() {
        return None;
    }

    let result = match form.mode() {
        CredentialsMode::Signup => state
            .session
            .signup(&form.username, &form.password)
            .await
            .map(Submitted::Created),
        CredentialsMode::Login => state
            .session
            .login(&form.username, &form.password)
            .await
            .map(Submitted::LoggedIn),
    };
    form.finish_submit();

    match result {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            form.apply_error(&err);
            print_form_errors(form.errors());
            None
        }
    }
}

/// Successful credential submit
enum Submitted {
    Created(String),
    LoggedIn(User),
}

async fn signup(state: &AppState, username: &str, password: &PasswordArg, then_login: bool) -> Result<bool> {
    if let Some(ViewAccess::Redirect { .. }) = state.guard.check_public() {
        eprintln!("{} Log out before creating another account", "[WARNING]".yellow());
        return Ok(false);
    }

    let password = resolve_password(password)?;
    let mut form = CredentialsForm::signup();
    form.set_field("username", username);
    form.set_field("password", &password);

    let Some(Submitted::Created(server_message)) = submit_credentials(state, &mut form).await else {
        return Ok(false);
    };
    debug!(message = %server_message, "Signup accepted");

    if !then_login {
        println!("{} {}", "[OK]".green(), SIGNUP_SUCCESS_MESSAGE);
        return Ok(true);
    }

    // Shown by the login step
    state.flash.put(SIGNUP_SUCCESS_MESSAGE);
    let mut login_form = CredentialsForm::login();
    login_form.username = form.username.clone();
    login_form.password = form.password.clone();
    Ok(finish_login(state, &mut login_form).await)
}

async fn login(state: &AppState, username: &str, password: &PasswordArg) -> Result<bool> {
    if let Some(ViewAccess::Redirect { .. }) = state.guard.check_public() {
        if let Some(user) = state.session.current_user() {
            println!("Already logged in as {}. Run {} first to switch accounts.", user.username.bold(), "plaza logout".cyan());
            return Ok(true);
        }
    }

    let password = resolve_password(password)?;
    let mut form = CredentialsForm::login();
    form.set_field("username", username);
    form.set_field("password", &password);

    Ok(finish_login(state, &mut form).await)
}

/// Show any pending flash message, then submit the login form
async fn finish_login(state: &AppState, form: &mut CredentialsForm) -> bool {
    if let Some(message) = state.flash.take() {
        println!("{} {}", "[OK]".green(), message);
    }

    match submit_credentials(state, form).await {
        Some(Submitted::LoggedIn(user)) => {
            println!("{} Logged in as {}", "[OK]".green(), user.display_label().bold());
            true
        }
        _ => false,
    }
}

fn show_status(state: &AppState, format: OutputFormat) {
    let session = state.session.snapshot();
    let expires = session.token.as_deref().and_then(expires_at);
    let store_path = state.config.session.store_path().ok();

    if format == OutputFormat::Json {
        let status = json!({
            "authenticated": session.is_authenticated(),
            "user": session.user,
            "expiresAt": expires,
            "apiUrl": state.config.api.base_url,
            "storePath": store_path,
        });
        println!("{}", status);
        return;
    }

    println!("Plaza Status:");
    println!();
    match &session.user {
        Some(user) if session.is_authenticated() => {
            println!("  [OK] Session: logged in as {}", user.username.green());
            if let Some(expires) = expires {
                println!("      expires {}", expires.to_rfc3339());
            }
        }
        _ if session.expired => println!("  [WARNING] Session: expired, please log in again"),
        _ => println!("  [WARNING] Session: not logged in"),
    }
    println!("  API: {}", state.config.api.base_url);
    if let Some(path) = store_path {
        println!("  Session store: {}", path.display());
    }
    println!();
}

fn print_user(user: &User, stats: Option<FollowStats>, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        let value = json!({ "user": user, "stats": stats });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{} (@{})", user.display_label().bold(), user.username);
    if let Some(bio) = user.bio.as_deref().filter(|b| !b.is_empty()) {
        println!("  {}", bio);
    }
    if let Some(photo) = &user.profile_photo_url {
        println!("  Photo: {}", photo);
    }
    if let Some(created_at) = user.created_at {
        println!("  Joined {}", created_at.format("%B %Y"));
    }
    if let Some(stats) = stats {
        println!(
            "  {} followers · {} following{}",
            stats.followers_count,
            stats.following_count,
            if stats.is_following { " · you follow" } else { "" }
        );
    }
    Ok(())
}

fn print_stats(user: &User, stats: &FollowStats, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }
    println!(
        "@{}: {} followers, {} following",
        user.username, stats.followers_count, stats.following_count
    );
    if stats.is_following {
        println!("  You follow @{}", user.username);
    }
    Ok(())
}

/// Whether `edit` was given anything to change
fn has_changes(display_name: Option<&str>, bio: Option<&str>, photo: Option<&Path>) -> bool {
    let update = ProfileUpdate {
        display_name: display_name.map(str::to_string),
        bio: bio.map(str::to_string),
    };
    !update.is_empty() || photo.is_some()
}

async fn edit_profile(
    state: &AppState,
    display_name: Option<&str>,
    bio: Option<&str>,
    photo: Option<&Path>,
    format: OutputFormat,
) -> Result<bool> {
    if require_user(state).is_none() {
        return Ok(false);
    }
    if !has_changes(display_name, bio, photo) {
        eprintln!("Nothing to change. Pass --display-name, --bio or --photo.");
        return Ok(false);
    }

    let me = match state.profiles.get_me().await {
        Ok(me) => me,
        Err(err) => return Ok(report(&err)),
    };

    let mut draft = ProfileDraft::from_user(&me);
    if let Some(name) = display_name {
        draft.set_field("displayName", name);
    }
    if let Some(bio) = bio {
        draft.set_field("bio", bio);
    }
    if let Some(path) = photo {
        if !draft.select_photo(path).await {
            print_form_errors(draft.errors());
            return Ok(false);
        }
    }

    if draft.submit(&state.profiles).await.is_err() {
        print_form_errors(draft.errors());
        return Ok(false);
    }

    println!("{} Profile updated", "[OK]".green());
    match state.profiles.get_me().await {
        Ok(user) => print_user(&user, None, format)?,
        Err(err) => debug!(error = %err, "Refresh after edit failed"),
    }
    Ok(true)
}

async fn delete_photo(state: &AppState) -> Result<bool> {
    if require_user(state).is_none() {
        return Ok(false);
    }
    let me = match state.profiles.get_me().await {
        Ok(me) => me,
        Err(err) => return Ok(report(&err)),
    };

    let mut draft = ProfileDraft::from_user(&me);
    match draft.delete_photo(&state.profiles).await {
        Ok(()) => {
            println!("{} Profile photo removed", "[OK]".green());
            Ok(true)
        }
        Err(err) => Ok(report(&err)),
    }
}

async fn change_relationship(state: &AppState, username: &str, follow: bool, format: OutputFormat) -> Result<bool> {
    if require_user(state).is_none() {
        return Ok(false);
    }
    let user = match state.profiles.get_user_by_username(username).await {
        Ok(user) => user,
        Err(err) => return Ok(report(&err)),
    };

    let controller = state.relationship();
    if let Err(err) = controller.bind(user.id).await {
        return Ok(report(&err));
    }
    if !controller.can_follow() {
        eprintln!("{} You cannot follow yourself", "[WARNING]".yellow());
        return Ok(false);
    }

    let result = if follow {
        controller.follow().await
    } else {
        controller.unfollow().await
    };
    controller.detach();

    match result {
        Ok(stats) => {
            let verb = if follow { "Following" } else { "Unfollowed" };
            println!("{} {} @{}", "[OK]".green(), verb, user.username);
            print_stats(&user, &stats, format)?;
            Ok(true)
        }
        Err(err) => Ok(report(&err)),
    }
}

async fn watch(state: &AppState) -> Result<bool> {
    let Some(user) = require_user(state) else {
        return Ok(false);
    };
    let mut changes = state.session.subscribe();

    println!(
        "Watching session for {} (checked every {}s, Ctrl+C to stop)",
        user.username.bold(),
        state.config.session.sweep_interval().as_secs()
    );

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    return Ok(true);
                }
                let session = changes.borrow_and_update().clone();
                if !session.is_authenticated() {
                    let reason = if session.expired { "expired" } else { "ended" };
                    println!("{} Session {}. Please log in again.", "[WARNING]".yellow(), reason);
                    return Ok(true);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopped watching; session kept");
                return Ok(true);
            }
        }
    }
}
