use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Queries a free account gets when the backend does not say otherwise.
pub const DEFAULT_QUERIES_LIMIT: u32 = 10;

/// Authorization role of a user. Unknown values coming from the backend are read as `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    BetaTester,
    #[default]
    #[serde(other)]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::BetaTester => "beta_tester",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Admin => "Administrador",
            Role::BetaTester => "Beta Tester",
            Role::User => "Usuário",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Role::Admin => "Acesso completo ao sistema",
            Role::BetaTester => "Acesso a funcionalidades beta",
            Role::User => "Acesso padrão do usuário",
        }
    }
}

/// Subscription plan. Unknown values coming from the backend are read as `Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subscription {
    Premium,
    Enterprise,
    #[default]
    #[serde(other)]
    Free,
}

impl Subscription {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subscription::Free => "free",
            Subscription::Premium => "premium",
            Subscription::Enterprise => "enterprise",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Subscription::Free => "Free",
            Subscription::Premium => "Premium",
            Subscription::Enterprise => "Enterprise",
        }
    }

    /// Paid plans have no query limit.
    pub fn is_unlimited(&self) -> bool {
        !matches!(self, Subscription::Free)
    }
}

/// The authenticated principal, as held by the session and persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,

    pub specialty: Option<String>,
    pub university: Option<String>,
    /// Year of the medical course (1-6).
    pub year: Option<u32>,

    pub subscription: Subscription,
    /// Only meaningful on the free plan.
    pub queries_count: u32,
    /// Only meaningful on the free plan.
    pub queries_limit: u32,

    pub is_active: bool,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Share of the monthly quota already used, 0-100. Always 0 on paid plans.
    pub fn usage_percentage(&self) -> f64 {
        if self.subscription.is_unlimited() || self.queries_limit == 0 {
            return 0.0;
        }

        (self.queries_count as f64 * 100.0 / self.queries_limit as f64).min(100.0)
    }

    /// Queries left this month, or `None` when the plan is unlimited.
    pub fn remaining_queries(&self) -> Option<u32> {
        if self.subscription.is_unlimited() {
            return None;
        }

        Some(self.queries_limit.saturating_sub(self.queries_count))
    }
}

/// A user record as the backend (or an older persisted blob) sends it.
/// Everything except the email may be missing; `normalize()` fills the gaps.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub role: Option<Role>,
    pub specialty: Option<String>,
    pub university: Option<String>,
    pub year: Option<u32>,
    pub subscription: Option<Subscription>,
    pub queries_count: Option<u32>,
    pub queries_limit: Option<u32>,
    pub is_active: Option<bool>,
    pub last_login: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl UserPayload {
    pub fn normalize(self) -> User {
        let now = now_iso8601();

        User {
            id: self.id,
            email: self.email,
            name: self.name,
            role: self.role.unwrap_or_default(),
            specialty: self.specialty,
            university: self.university,
            year: self.year,
            subscription: self.subscription.unwrap_or_default(),
            queries_count: self.queries_count.unwrap_or(0),
            queries_limit: self.queries_limit.unwrap_or(DEFAULT_QUERIES_LIMIT),
            is_active: self.is_active.unwrap_or(true),
            last_login: self.last_login,
            created_at: self.created_at.unwrap_or_else(|| now.clone()),
            updated_at: self.updated_at.unwrap_or(now),
        }
    }
}

pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Body of `POST /api/auth/register`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
}

/// Body of `PUT /api/auth/profile`. The optional attributes are always sent; `None` clears them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub university: Option<String>,
    pub year: Option<u32>,
}

impl ProfileUpdate {
    /// Builds an update from raw form fields: values are trimmed, blanks become `None`
    /// and a year that is not a number is dropped.
    pub fn from_form(name: &str, specialty: &str, university: &str, year: &str) -> Self {
        let non_blank = |value: &str| {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };

        Self {
            name: non_blank(name),
            specialty: non_blank(specialty),
            university: non_blank(university),
            year: year.trim().parse().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_applies_defaults() {
        let payload: UserPayload = serde_json::from_value(json!({
            "id": "u1",
            "email": "doc@example.com",
            "name": "Dr. Silva",
            "role": "user"
        }))
        .unwrap();

        let user = payload.normalize();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.subscription, Subscription::Free);
        assert_eq!(user.queries_limit, DEFAULT_QUERIES_LIMIT);
        assert_eq!(user.queries_count, 0);
        assert!(user.is_active);
        assert!(user.created_at.ends_with('Z'));
        assert_eq!(user.created_at, user.updated_at);
    }

    #[test]
    fn unknown_role_and_plan_fall_back() {
        let payload: UserPayload = serde_json::from_value(json!({
            "email": "x@example.com",
            "role": "superuser",
            "subscription": "gold"
        }))
        .unwrap();

        let user = payload.normalize();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.subscription, Subscription::Free);
    }

    #[test]
    fn unknown_plan_reads_as_free_and_round_trips() {
        let plan: Subscription = serde_json::from_value(json!("platinum")).unwrap();
        assert_eq!(plan, Subscription::Free);
        assert_eq!(serde_json::to_value(plan).unwrap(), json!("free"));
        assert_eq!(serde_json::to_value(Subscription::Enterprise).unwrap(), json!("enterprise"));
        assert_eq!(Subscription::default(), Subscription::Free);
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn roles_round_trip_as_snake_case() {
        assert_eq!(serde_json::to_value(Role::BetaTester).unwrap(), json!("beta_tester"));
        let role: Role = serde_json::from_value(json!("admin")).unwrap();
        assert_eq!(role, Role::Admin);
        assert_eq!(role.as_str(), "admin");
    }

    #[test]
    fn payload_without_email_is_rejected() {
        let result = serde_json::from_value::<UserPayload>(json!({ "name": "No Mail" }));
        assert!(result.is_err());
    }

    #[test]
    fn usage_on_free_plan() {
        let mut user = UserPayload {
            email: "a@b.c".into(),
            queries_count: Some(4),
            ..Default::default()
        }
        .normalize();

        assert_eq!(user.usage_percentage(), 40.0);
        assert_eq!(user.remaining_queries(), Some(6));

        user.queries_count = 25;
        assert_eq!(user.usage_percentage(), 100.0);
        assert_eq!(user.remaining_queries(), Some(0));
    }

    #[test]
    fn usage_on_paid_plan_is_unlimited() {
        let user = UserPayload {
            email: "a@b.c".into(),
            subscription: Some(Subscription::Premium),
            queries_count: Some(300),
            ..Default::default()
        }
        .normalize();

        assert_eq!(user.usage_percentage(), 0.0);
        assert_eq!(user.remaining_queries(), None);
    }

    #[test]
    fn profile_update_from_form() {
        let update = ProfileUpdate::from_form(" Dr. Silva ", "  ", "USP", "3");
        assert_eq!(
            update,
            ProfileUpdate {
                name: Some("Dr. Silva".into()),
                specialty: None,
                university: Some("USP".into()),
                year: Some(3),
            }
        );

        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(
            body,
            json!({ "name": "Dr. Silva", "specialty": null, "university": "USP", "year": 3 })
        );
    }

    #[test]
    fn registration_skips_empty_optionals() {
        let form = RegistrationForm {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password: "secret123".into(),
            ..Default::default()
        };

        let body = serde_json::to_value(&form).unwrap();
        assert_eq!(
            body,
            json!({ "name": "Ana", "email": "ana@example.com", "password": "secret123" })
        );
    }
}
