use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Per-user notification toggles shown on the account page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    pub newsletter: bool,
    pub order_updates: bool,
    pub promotions: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            newsletter: false,
            order_updates: true,
            promotions: false,
        }
    }
}

/// A registered shopper or administrator. Password material never leaves the
/// store, so it has no field here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub preferences: Preferences,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Customer, Role::Admin] {
            assert_eq!(Role::from_str(role.as_str()), Ok(role));
        }
        assert!(Role::from_str("superuser").is_err());
    }

    #[test]
    fn default_preferences_only_enable_order_updates() {
        let prefs = Preferences::default();
        assert!(!prefs.newsletter);
        assert!(prefs.order_updates);
        assert!(!prefs.promotions);
    }

    #[test]
    fn user_serializes_without_password_fields() {
        let user = User {
            id: 7,
            name: "Sam".to_string(),
            email: "sam@example.com".to_string(),
            role: Role::Admin,
            preferences: Preferences::default(),
            created_at: "2024-01-01 00:00:00".to_string(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["role"], "admin");
        assert_eq!(json["preferences"]["order_updates"], true);
        assert!(json.get("password").is_none());
        assert!(json.get("password_hash").is_none());
        assert!(user.is_admin());
    }
}
