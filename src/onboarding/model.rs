//! Onboarding data models: components, pages, users and profiles.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// `current_step` value meaning onboarding is complete.
pub const TERMINAL_STEP: i64 = 4;

/// A named optional form section that can be placed on page 2 or page 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentName {
    AboutMe,
    Address,
    Birthdate,
}

impl ComponentName {
    /// Every component, in render order.
    pub const ALL: [ComponentName; 3] = [Self::AboutMe, Self::Address, Self::Birthdate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AboutMe => "about_me",
            Self::Address => "address",
            Self::Birthdate => "birthdate",
        }
    }

    /// Human-readable heading.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AboutMe => "About Me",
            Self::Address => "Address",
            Self::Birthdate => "Birthdate",
        }
    }

    /// Profile fields this component edits.
    pub fn fields(&self) -> &'static [ProfileField] {
        match self {
            Self::AboutMe => &[ProfileField::AboutMe],
            Self::Address => &[
                ProfileField::StreetAddress,
                ProfileField::City,
                ProfileField::State,
                ProfileField::Zip,
            ],
            Self::Birthdate => &[ProfileField::Birthdate],
        }
    }
}

impl std::fmt::Display for ComponentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "about_me" => Ok(Self::AboutMe),
            "address" => Ok(Self::Address),
            "birthdate" => Ok(Self::Birthdate),
            other => Err(ValidationError::UnknownComponent(other.to_string())),
        }
    }
}

/// One of the two configurable wizard pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum PageNumber {
    #[default]
    Two,
    Three,
}

impl PageNumber {
    pub const ALL: [PageNumber; 2] = [Self::Two, Self::Three];

    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Two => 2,
            Self::Three => 3,
        }
    }
}

impl TryFrom<i64> for PageNumber {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            other => Err(ValidationError::InvalidPage(other)),
        }
    }
}

impl From<PageNumber> for i64 {
    fn from(page: PageNumber) -> Self {
        page.as_i64()
    }
}

impl std::fmt::Display for PageNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// Placement of a single component. Unique per `component_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAssignment {
    pub component_name: ComponentName,
    pub page_number: PageNumber,
}

impl ComponentAssignment {
    pub fn new(component_name: ComponentName, page_number: PageNumber) -> Self {
        Self {
            component_name,
            page_number,
        }
    }
}

/// An editable profile column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    AboutMe,
    StreetAddress,
    City,
    State,
    Zip,
    Birthdate,
}

impl ProfileField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AboutMe => "about_me",
            Self::StreetAddress => "street_address",
            Self::City => "city",
            Self::State => "state",
            Self::Zip => "zip",
            Self::Birthdate => "birthdate",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AboutMe => "About Me",
            Self::StreetAddress => "Street Address",
            Self::City => "City",
            Self::State => "State",
            Self::Zip => "Zip Code",
            Self::Birthdate => "Birthdate",
        }
    }
}

/// A user row. The stored credential is write-only and never read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnboardingUser {
    pub id: i64,
    pub email: String,
    pub current_step: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OnboardingUser {
    pub fn is_complete(&self) -> bool {
        self.current_step >= TERMINAL_STEP
    }
}

/// A stored profile. One per user, created empty alongside the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub about_me: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub birthdate: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Column values written by a step save. `None` is stored as NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub about_me: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub birthdate: Option<String>,
}

/// In-session field values as the user is typing them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileFields {
    pub about_me: String,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub birthdate: String,
}

impl ProfileFields {
    pub fn get(&self, field: ProfileField) -> &str {
        match field {
            ProfileField::AboutMe => &self.about_me,
            ProfileField::StreetAddress => &self.street_address,
            ProfileField::City => &self.city,
            ProfileField::State => &self.state,
            ProfileField::Zip => &self.zip,
            ProfileField::Birthdate => &self.birthdate,
        }
    }

    /// Set a field, rejecting a non-empty birthdate that is not `YYYY-MM-DD`.
    pub fn set(&mut self, field: ProfileField, value: impl Into<String>) -> Result<(), ValidationError> {
        let value = value.into();
        if field == ProfileField::Birthdate
            && !value.is_empty()
            && NaiveDate::parse_from_str(&value, "%Y-%m-%d").is_err()
        {
            return Err(ValidationError::InvalidBirthdate { value });
        }
        let slot = match field {
            ProfileField::AboutMe => &mut self.about_me,
            ProfileField::StreetAddress => &mut self.street_address,
            ProfileField::City => &mut self.city,
            ProfileField::State => &mut self.state,
            ProfileField::Zip => &mut self.zip,
            ProfileField::Birthdate => &mut self.birthdate,
        };
        *slot = value;
        Ok(())
    }

    /// Populate from a stored profile; NULL columns become empty strings.
    pub fn from_profile(profile: &UserProfile) -> Self {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            about_me: text(&profile.about_me),
            street_address: text(&profile.street_address),
            city: text(&profile.city),
            state: text(&profile.state),
            zip: text(&profile.zip),
            birthdate: text(&profile.birthdate),
        }
    }

    /// Convert to a column update, nulling empty strings.
    pub fn to_update(&self) -> ProfileUpdate {
        let nullable = |v: &str| (!v.is_empty()).then(|| v.to_string());
        ProfileUpdate {
            about_me: nullable(&self.about_me),
            street_address: nullable(&self.street_address),
            city: nullable(&self.city),
            state: nullable(&self.state),
            zip: nullable(&self.zip),
            birthdate: nullable(&self.birthdate),
        }
    }
}

/// A user joined to their profile, as returned by the data listing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserWithProfile {
    pub user: OnboardingUser,
    pub profile: Option<UserProfile>,
}

/// Keys used in the `device_settings` table.
pub mod settings_keys {
    /// Last user id seen on this device.
    pub const REMEMBERED_USER_ID: &str = "rvs_user_id";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_names_roundtrip_through_str() {
        for component in ComponentName::ALL {
            let parsed: ComponentName = component.as_str().parse().unwrap();
            assert_eq!(parsed, component);
            let json = serde_json::to_string(&component).unwrap();
            assert_eq!(json, format!("\"{component}\""));
        }
        assert_eq!(
            "avatar".parse::<ComponentName>(),
            Err(ValidationError::UnknownComponent("avatar".into()))
        );
    }

    #[test]
    fn address_component_owns_four_fields() {
        assert_eq!(ComponentName::Address.fields().len(), 4);
        assert_eq!(ComponentName::AboutMe.fields(), &[ProfileField::AboutMe]);
    }

    #[test]
    fn page_number_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&PageNumber::Three).unwrap(), "3");
        let parsed: PageNumber = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, PageNumber::Two);
        assert!(serde_json::from_str::<PageNumber>("4").is_err());
        assert_eq!(PageNumber::default(), PageNumber::Two);
    }

    #[test]
    fn empty_fields_become_null() {
        let mut fields = ProfileFields::default();
        fields.set(ProfileField::AboutMe, "hi").unwrap();
        let update = fields.to_update();
        assert_eq!(update.about_me.as_deref(), Some("hi"));
        assert_eq!(update.city, None);
        assert_eq!(update.birthdate, None);
    }

    #[test]
    fn birthdate_must_be_iso_date() {
        let mut fields = ProfileFields::default();
        assert!(fields.set(ProfileField::Birthdate, "2000-01-01").is_ok());
        assert!(fields.set(ProfileField::Birthdate, "").is_ok());
        let err = fields.set(ProfileField::Birthdate, "01/01/2000").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidBirthdate { .. }));
        assert_eq!(fields.birthdate, "");
    }

    #[test]
    fn fields_from_profile_fill_missing_with_empty() {
        let profile = UserProfile {
            user_id: 7,
            city: Some("Austin".into()),
            ..Default::default()
        };
        let fields = ProfileFields::from_profile(&profile);
        assert_eq!(fields.get(ProfileField::City), "Austin");
        assert_eq!(fields.get(ProfileField::Zip), "");
    }
}
