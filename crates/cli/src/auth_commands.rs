use {
    anyhow::Result,
    secrecy::SecretString,
    tidings_common::SessionState,
    tidings_routing::Decision,
};

use crate::context::AppContext;

pub async fn login(ctx: &AppContext, email: &str, password: String) -> Result<()> {
    ctx.session
        .login(email, SecretString::new(password))
        .await?;
    let session = ctx.session.snapshot();
    println!("Logged in as {} <{}>", session.display_name, session.email);
    Ok(())
}

pub async fn register(
    ctx: &AppContext,
    name: &str,
    email: &str,
    password: String,
    confirmation: String,
) -> Result<()> {
    ctx.session
        .register(
            name,
            email,
            SecretString::new(password),
            SecretString::new(confirmation),
        )
        .await?;
    println!("Registered and logged in as {name}");
    Ok(())
}

pub fn logout(ctx: &AppContext) {
    let was = ctx.session.state();
    ctx.session.logout();
    if was == SessionState::Anonymous {
        println!("Not logged in.");
    } else {
        println!("Logged out.");
    }
}

pub fn whoami(ctx: &AppContext) {
    let session = ctx.session.snapshot();
    if !session.is_authenticated() {
        println!("Not logged in.");
        return;
    }
    println!(
        "{} <{}> (id {})",
        session.display_name,
        session.email,
        session.user_id.as_deref().unwrap_or("?")
    );
    println!("roles:       {}", join(session.roles.iter()));
    println!("permissions: {}", join(session.permissions.iter()));
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let items: Vec<&str> = items.collect();
    if items.is_empty() {
        "-".into()
    } else {
        items.join(", ")
    }
}

/// Prints `yes`/`no`; exits non-zero when the permission is missing.
pub fn can(ctx: &AppContext, permission: &str) -> bool {
    let allowed = ctx.session.can(permission);
    println!("{}", if allowed { "yes" } else { "no" });
    allowed
}

pub fn route(ctx: &AppContext, path: &str) {
    let decision = ctx.session.decide(path);
    match ctx.session.policy().destination(decision) {
        None => println!("{path}: allowed"),
        Some(target) => {
            let reason = match decision {
                Decision::RedirectToLogin => "login required",
                _ => "already logged in",
            };
            println!("{path}: redirect to {target} ({reason})");
        },
    }
}
