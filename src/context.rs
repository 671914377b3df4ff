use serde::{Deserialize, Serialize};

use crate::{error::ConversionError, AttributeValue, Attributes};

/// Per-call evaluation input: who is being evaluated and with which targeting attributes.
///
/// `application` and `environment` are optional here; when unset, the values from
/// [`ClientConfig`](crate::ClientConfig) are used.
///
/// # Examples
/// ```
/// # use hyphen_toggle::{EvaluationContext, UserContext};
/// let context = EvaluationContext::new()
///     .targeting_key("user-123")
///     .ip_address("203.0.113.7")
///     .custom_attribute("plan", "pro")
///     .user(UserContext::new().id("user-123").email("jane@example.com"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    /// Subject of the evaluation. Falls back to `user.id` when absent or empty.
    pub targeting_key: Option<String>,
    /// Overrides the configured application.
    pub application: Option<String>,
    /// Overrides the configured environment.
    pub environment: Option<String>,
    /// Client IP address, if known.
    pub ip_address: Option<String>,
    /// Arbitrary targeting attributes.
    #[serde(default)]
    pub custom_attributes: Attributes,
    /// The user being evaluated, if any.
    pub user: Option<UserContext>,
}

/// User-specific part of [`EvaluationContext`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    /// User id. Used as the targeting key when the context has none.
    pub id: Option<String>,
    /// User email.
    pub email: Option<String>,
    /// User display name.
    pub name: Option<String>,
    /// Arbitrary user attributes.
    #[serde(default)]
    pub custom_attributes: Attributes,
}

impl EvaluationContext {
    /// Create an empty context.
    pub fn new() -> EvaluationContext {
        EvaluationContext::default()
    }

    /// Set the subject of the evaluation.
    pub fn targeting_key(mut self, targeting_key: impl Into<String>) -> Self {
        self.targeting_key = Some(targeting_key.into());
        self
    }

    /// Override the configured application for this call.
    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    /// Override the configured environment for this call.
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Set the client IP address.
    pub fn ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    /// Add a custom attribute, replacing any previous value under `key`.
    pub fn custom_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.custom_attributes.insert(key.into(), value.into());
        self
    }

    /// Set the user being evaluated.
    pub fn user(mut self, user: UserContext) -> Self {
        self.user = Some(user);
        self
    }

    /// Build a context from a generic attribute bag, as handed over by a feature flag framework.
    ///
    /// Recognized keys are `application`, `environment`, `ipAddress`, `customAttributes` and
    /// `user` (with `id`, `email`, `name` and `customAttributes`). Other keys are ignored. A
    /// recognized key holding a value of the wrong kind is a [`ConversionError`]; `null` is treated
    /// as absent.
    ///
    /// ```
    /// # use hyphen_toggle::{Attributes, AttributeValue, EvaluationContext};
    /// let bag: Attributes = [
    ///     ("ipAddress".to_owned(), "127.0.0.1".into()),
    ///     ("environment".to_owned(), "staging".into()),
    /// ].into_iter().collect();
    /// let context = EvaluationContext::from_attributes(Some("user-1".to_owned()), &bag).unwrap();
    /// assert_eq!(context.environment.as_deref(), Some("staging"));
    /// ```
    pub fn from_attributes(
        targeting_key: Option<String>,
        bag: &Attributes,
    ) -> Result<EvaluationContext, ConversionError> {
        let user = match non_null(bag, "user") {
            Some(value) => {
                let user = value.as_map().ok_or_else(|| mismatch("user", "map", value))?;
                Some(UserContext {
                    id: string_field(user, "id", "user.id")?,
                    email: string_field(user, "email", "user.email")?,
                    name: string_field(user, "name", "user.name")?,
                    custom_attributes: map_field(
                        user,
                        "customAttributes",
                        "user.customAttributes",
                    )?,
                })
            }
            None => None,
        };

        Ok(EvaluationContext {
            targeting_key,
            application: string_field(bag, "application", "application")?,
            environment: string_field(bag, "environment", "environment")?,
            ip_address: string_field(bag, "ipAddress", "ipAddress")?,
            custom_attributes: map_field(bag, "customAttributes", "customAttributes")?,
            user,
        })
    }
}

impl UserContext {
    /// Create an empty user.
    pub fn new() -> UserContext {
        UserContext::default()
    }

    /// Set the user id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the user email.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the user display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a user attribute, replacing any previous value under `key`.
    pub fn custom_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.custom_attributes.insert(key.into(), value.into());
        self
    }
}

fn non_null<'a>(bag: &'a Attributes, key: &str) -> Option<&'a AttributeValue> {
    bag.get(key).filter(|value| !value.is_null())
}

fn mismatch(path: &str, expected: &str, found: &AttributeValue) -> ConversionError {
    ConversionError::new(path, format!("expected {expected}, found {}", found.kind()))
}

fn string_field(
    bag: &Attributes,
    key: &str,
    path: &str,
) -> Result<Option<String>, ConversionError> {
    non_null(bag, key)
        .map(|value| {
            value
                .as_str()
                .map(ToOwned::to_owned)
                .ok_or_else(|| mismatch(path, "string", value))
        })
        .transpose()
}

fn map_field(bag: &Attributes, key: &str, path: &str) -> Result<Attributes, ConversionError> {
    match non_null(bag, key) {
        Some(value) => value
            .as_map()
            .cloned()
            .ok_or_else(|| mismatch(path, "map", value)),
        None => Ok(Attributes::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(entries: Vec<(&str, AttributeValue)>) -> Attributes {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect()
    }

    #[test]
    fn from_attributes_reads_known_fields() {
        let user = bag(vec![
            ("id", "user-123".into()),
            ("name", "Test User".into()),
            ("email", "test@example.com".into()),
            (
                "customAttributes",
                bag(vec![("role", "admin".into())]).into(),
            ),
        ]);
        let context = EvaluationContext::from_attributes(
            Some("test-user".to_owned()),
            &bag(vec![
                ("user", user.into()),
                ("ipAddress", "127.0.0.1".into()),
                (
                    "customAttributes",
                    bag(vec![("region", "us-east".into())]).into(),
                ),
                ("unrelated", 5.into()),
            ]),
        )
        .unwrap();

        assert_eq!(context.targeting_key.as_deref(), Some("test-user"));
        assert_eq!(context.ip_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(context.application, None);
        assert_eq!(context.custom_attributes["region"].as_str(), Some("us-east"));
        let user = context.user.unwrap();
        assert_eq!(user.id.as_deref(), Some("user-123"));
        assert_eq!(user.name.as_deref(), Some("Test User"));
        assert_eq!(user.email.as_deref(), Some("test@example.com"));
        assert_eq!(user.custom_attributes["role"].as_str(), Some("admin"));
    }

    #[test]
    fn from_attributes_treats_null_as_absent() {
        let context =
            EvaluationContext::from_attributes(None, &bag(vec![("user", AttributeValue::Null)]))
                .unwrap();
        assert_eq!(context.user, None);
    }

    #[test]
    fn from_attributes_rejects_wrong_kinds() {
        let err = EvaluationContext::from_attributes(None, &bag(vec![("application", 5.into())]))
            .unwrap_err();
        assert_eq!(err.path, "application");

        let err = EvaluationContext::from_attributes(
            None,
            &bag(vec![("user", bag(vec![("id", true.into())]).into())]),
        )
        .unwrap_err();
        assert_eq!(err.path, "user.id");
    }
}
