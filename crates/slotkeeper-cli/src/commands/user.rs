use super::{core_err, json_pretty, EXIT_SUCCESS};
use slotkeeper_core::ReservationEngine;
use slotkeeper_schema::{user, Specification, User, UserId};
use slotkeeper_store::Repository;
use std::sync::Arc;

fn print_user(u: &User) {
    println!("user_id:    {}", u.id);
    println!("email:      {}", u.email);
    println!("name:       {}", u.display_name);
    println!("verified:   {}", u.email_confirmed);
    println!("created_at: {}", u.created_at);
}

pub fn add(engine: &ReservationEngine, email: &str, name: Option<&str>, json: bool) -> Result<u8, String> {
    let display_name = name
        .map(str::to_owned)
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_owned());
    let u = engine
        .register_user(email, &display_name)
        .map_err(|e| core_err(&e))?;
    if json {
        println!("{}", json_pretty(&u)?);
    } else {
        print_user(&u);
    }
    Ok(EXIT_SUCCESS)
}

pub fn verify(engine: &ReservationEngine, user_id: &str, json: bool) -> Result<u8, String> {
    let u = engine
        .confirm_email(&UserId::new(user_id))
        .map_err(|e| core_err(&e))?;
    if json {
        println!("{}", json_pretty(&u)?);
    } else {
        println!("verified {} <{}>", u.id, u.email);
    }
    Ok(EXIT_SUCCESS)
}

pub fn list(engine: &ReservationEngine, unverified: bool, all: bool, json: bool) -> Result<u8, String> {
    let mut spec = Specification::<User>::all();
    if unverified {
        spec = spec & user::unverified();
    }
    if !all {
        spec = spec & Specification::not_deleted();
    }
    let users: Vec<User> = Repository::<User>::new(Arc::clone(engine.backend()))
        .query(&spec)
        .map_err(|e| format!("store error: {e}"))?
        .into_iter()
        .map(|v| v.entity)
        .collect();

    if json {
        println!("{}", json_pretty(&users)?);
    } else if users.is_empty() {
        println!("no users found");
    } else {
        println!("{:<30} {:<9} {:<8} EMAIL", "USER_ID", "VERIFIED", "DELETED");
        for u in &users {
            println!(
                "{:<30} {:<9} {:<8} {}",
                u.id.as_str(),
                u.email_confirmed,
                u.deleted_at.is_some(),
                u.email
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
