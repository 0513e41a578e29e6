//! Read-only listing of every account and its profile, newest first.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::{TERMINAL_STEP, UserWithProfile};
use crate::error::DatabaseError;
use crate::store::Database;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserListing {
    pub id: i64,
    pub email: String,
    pub current_step: i64,
    /// `"Done"` once the wizard is complete, otherwise `"{step}/3"`.
    pub status: String,
    pub about_me: Option<String>,
    pub address: Option<String>,
    pub birthdate: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserListingPage {
    pub count: usize,
    pub users: Vec<UserListing>,
}

pub fn step_status(current_step: i64) -> String {
    if current_step >= TERMINAL_STEP {
        "Done".to_string()
    } else {
        format!("{current_step}/3")
    }
}

/// Join the non-empty address parts with `", "`.
pub fn format_address(parts: &[Option<&str>]) -> Option<String> {
    let joined = parts
        .iter()
        .flatten()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!joined.is_empty()).then_some(joined)
}

impl From<UserWithProfile> for UserListing {
    fn from(row: UserWithProfile) -> Self {
        let UserWithProfile { user, profile } = row;
        let profile = profile.unwrap_or_default();
        let address = format_address(&[
            profile.street_address.as_deref(),
            profile.city.as_deref(),
            profile.state.as_deref(),
            profile.zip.as_deref(),
        ]);
        Self {
            id: user.id,
            status: step_status(user.current_step),
            email: user.email,
            current_step: user.current_step,
            about_me: profile.about_me,
            address,
            birthdate: profile.birthdate,
            created_at: user.created_at,
        }
    }
}

pub async fn list_users(db: &dyn Database) -> Result<UserListingPage, DatabaseError> {
    let users: Vec<UserListing> = db
        .list_users_with_profiles()
        .await?
        .into_iter()
        .map(UserListing::from)
        .collect();
    Ok(UserListingPage {
        count: users.len(),
        users,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::model::ProfileUpdate;
    use crate::store::LibSqlBackend;
    use secrecy::SecretString;

    #[test]
    fn status_labels() {
        assert_eq!(step_status(1), "1/3");
        assert_eq!(step_status(2), "2/3");
        assert_eq!(step_status(3), "3/3");
        assert_eq!(step_status(4), "Done");
        assert_eq!(step_status(7), "Done");
    }

    #[test]
    fn address_skips_missing_parts() {
        assert_eq!(
            format_address(&[Some("1 Main St"), None, Some("TX"), Some("")]),
            Some("1 Main St, TX".to_string())
        );
        assert_eq!(format_address(&[None, Some(" "), None, None]), None);
    }

    #[tokio::test]
    async fn lists_newest_first_with_status() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let pw = SecretString::from("x".to_string());
        let first = db.create_user("first@b.com", &pw, 2).await.unwrap();
        let second = db.create_user("second@b.com", &pw, 4).await.unwrap();
        db.update_profile(
            second.id,
            &ProfileUpdate {
                about_me: Some("hi".into()),
                city: Some("Austin".into()),
                state: Some("TX".into()),
                birthdate: Some("2000-01-01".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let page = list_users(&db).await.unwrap();
        assert_eq!(page.count, 2);
        assert_eq!(page.users[0].id, second.id);
        assert_eq!(page.users[0].status, "Done");
        assert_eq!(page.users[0].address.as_deref(), Some("Austin, TX"));
        assert_eq!(page.users[0].birthdate.as_deref(), Some("2000-01-01"));
        assert_eq!(page.users[1].id, first.id);
        assert_eq!(page.users[1].status, "2/3");
        assert_eq!(page.users[1].about_me, None);
        assert_eq!(page.users[1].address, None);
    }
}
