use std::sync::OnceLock;

use crate::auth::password;
use crate::db::{now_timestamp, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{Role, User, USER_COLS};

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub role: Role,
}

const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_new_user(user: &NewUser<'_>) -> AppResult<()> {
    if user.name.trim().is_empty() {
        return Err(AppError::InvalidArgument("Name is required".to_string()));
    }
    if user.email.trim().is_empty() || !user.email.contains('@') {
        return Err(AppError::InvalidArgument("Invalid email address".to_string()));
    }
    if user.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidArgument(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn create_user(pool: &DbPool, new_user: NewUser<'_>) -> AppResult<User> {
    validate_new_user(&new_user)?;

    let email = new_user.email.trim().to_lowercase();
    let password_hash = password::hash_password(new_user.password)?;
    let now = now_timestamp();

    let conn = pool.get()?;
    let result = conn.execute(
        "INSERT INTO users (name, email, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![new_user.name.trim(), email, password_hash, new_user.role, now],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(AppError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }
        Err(e) => return Err(AppError::Database(e)),
    }

    let user = User {
        id: conn.last_insert_rowid(),
        name: new_user.name.trim().to_string(),
        email,
        password_hash,
        role: new_user.role,
        payment_method_id: None,
        created_at: now,
    };
    tracing::info!(user_id = user.id, role = %user.role, "User created");
    Ok(user)
}

pub fn find_by_email(pool: &DbPool, email: &str) -> AppResult<Option<User>> {
    let conn = pool.get()?;
    let result = conn.query_row(
        &format!("SELECT {USER_COLS} FROM users WHERE email = ?1"),
        rusqlite::params![email.trim().to_lowercase()],
        User::from_row,
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AppError::Database(e)),
    }
}

/// Hash verified against when the email is unknown, so both failure paths pay the argon2 cost.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| password::hash_password("no-such-account").unwrap_or_default())
}

/// Check an email/password pair. Unknown email and wrong password look the same.
pub fn authenticate(pool: &DbPool, email: &str, password: &str) -> AppResult<User> {
    let Some(user) = find_by_email(pool, email)? else {
        if let Err(e) = password::verify_password(password, dummy_hash()) {
            tracing::error!("Dummy password check failed: {e}");
        }
        return Err(AppError::Unauthenticated);
    };

    if !password::verify_password(password, &user.password_hash)? {
        tracing::warn!(user_id = user.id, "Login failed: wrong password");
        return Err(AppError::Unauthenticated);
    }
    Ok(user)
}

/// Create the configured administrator if no account holds that email yet.
pub fn ensure_admin(pool: &DbPool, name: &str, email: &str, password: &str) -> AppResult<()> {
    match find_by_email(pool, email)? {
        Some(existing) if existing.role == Role::Admin => Ok(()),
        Some(existing) => {
            tracing::warn!(
                user_id = existing.id,
                "Seed admin email belongs to a non-admin account; leaving it unchanged"
            );
            Ok(())
        }
        None => {
            create_user(
                pool,
                NewUser {
                    name,
                    email,
                    password,
                    role: Role::Admin,
                },
            )?;
            tracing::info!("Seeded admin account");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    fn signup<'a>(email: &'a str, password: &'a str) -> NewUser<'a> {
        NewUser {
            name: "Grace",
            email,
            password,
            role: Role::User,
        }
    }

    #[test]
    fn created_user_stores_a_hash_not_the_password() {
        let pool = memory_pool();
        let user = create_user(&pool, signup("grace@example.com", "hopper-1906")).unwrap();

        let stored: String = pool
            .get()
            .unwrap()
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?1",
                [user.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_ne!(stored, "hopper-1906");
        assert!(password::verify_password("hopper-1906", &stored).unwrap());
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let pool = memory_pool();
        create_user(&pool, signup("grace@example.com", "hopper-1906")).unwrap();
        let err = create_user(&pool, signup("Grace@Example.com", "another-pass")).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn invalid_signups_are_rejected() {
        let pool = memory_pool();
        for bad in [
            NewUser { name: " ", email: "a@b.c", password: "long-enough", role: Role::User },
            NewUser { name: "A", email: "nope", password: "long-enough", role: Role::User },
            NewUser { name: "A", email: "a@b.c", password: "short", role: Role::User },
        ] {
            assert!(matches!(create_user(&pool, bad), Err(AppError::InvalidArgument(_))));
        }
        assert_eq!(crate::db::count_rows(&pool, "users"), 0);
    }

    #[test]
    fn authenticate_checks_password() {
        let pool = memory_pool();
        create_user(&pool, signup("grace@example.com", "hopper-1906")).unwrap();

        assert!(authenticate(&pool, "grace@example.com", "hopper-1906").is_ok());
        assert!(matches!(
            authenticate(&pool, "grace@example.com", "wrong-pass"),
            Err(AppError::Unauthenticated)
        ));
        assert!(matches!(
            authenticate(&pool, "nobody@example.com", "hopper-1906"),
            Err(AppError::Unauthenticated)
        ));
    }

    #[test]
    fn unknown_email_runs_a_real_password_check() {
        assert!(!password::verify_password("no-such-account-guess", dummy_hash()).unwrap());
        assert!(password::verify_password("no-such-account", dummy_hash()).unwrap());
    }

    #[test]
    fn ensure_admin_is_idempotent() {
        let pool = memory_pool();
        ensure_admin(&pool, "Root", "root@example.com", "root-password").unwrap();
        ensure_admin(&pool, "Root", "root@example.com", "root-password").unwrap();

        let admin = find_by_email(&pool, "root@example.com").unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(crate::db::count_rows(&pool, "users"), 1);
    }
}
