use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    #[sqlx(rename = "user_id")]
    pub id: String, // generated at signup, also the password salt
    pub email: String,
    pub name: String,
    #[sqlx(rename = "company_name")]
    pub company: String,
    #[sqlx(rename = "password")]
    pub password_hash: String,
    pub registered_on: OffsetDateTime,
    pub updated_on: OffsetDateTime, // refreshed by the store on every update
    pub active: bool,
    pub active_devices: i32,
}

/// Columns a filter or update may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserField {
    Id,
    Email,
    Name,
    Company,
    PasswordHash,
    Active,
    ActiveDevices,
}

impl UserField {
    pub fn column(self) -> &'static str {
        match self {
            Self::Id => "user_id",
            Self::Email => "email",
            Self::Name => "name",
            Self::Company => "company_name",
            Self::PasswordHash => "password",
            Self::Active => "active",
            Self::ActiveDevices => "active_devices",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Int(i32),
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

/// Conjunction of `field = value` pairs, used both as a WHERE filter and as a SET list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(Vec<(UserField, FieldValue)>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pair; a repeated field replaces the earlier value.
    pub fn with(mut self, field: UserField, value: impl Into<FieldValue>) -> Self {
        let value = value.into();
        match self.0.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = value,
            None => self.0.push((field, value)),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &(UserField, FieldValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl User {
    fn value_of(&self, field: UserField) -> FieldValue {
        match field {
            UserField::Id => FieldValue::Text(self.id.clone()),
            UserField::Email => FieldValue::Text(self.email.clone()),
            UserField::Name => FieldValue::Text(self.name.clone()),
            UserField::Company => FieldValue::Text(self.company.clone()),
            UserField::PasswordHash => FieldValue::Text(self.password_hash.clone()),
            UserField::Active => FieldValue::Bool(self.active),
            UserField::ActiveDevices => FieldValue::Int(self.active_devices),
        }
    }

    pub fn matches(&self, filter: &Fields) -> bool {
        filter.iter().all(|(f, v)| self.value_of(*f) == *v)
    }

    /// Applies a SET list; pairs whose value type does not fit the field are errors.
    pub fn apply(&mut self, set: &Fields) -> anyhow::Result<()> {
        for (field, value) in set.iter() {
            match (field, value) {
                (UserField::Id, FieldValue::Text(v)) => self.id = v.clone(),
                (UserField::Email, FieldValue::Text(v)) => self.email = v.clone(),
                (UserField::Name, FieldValue::Text(v)) => self.name = v.clone(),
                (UserField::Company, FieldValue::Text(v)) => self.company = v.clone(),
                (UserField::PasswordHash, FieldValue::Text(v)) => self.password_hash = v.clone(),
                (UserField::Active, FieldValue::Bool(v)) => self.active = *v,
                (UserField::ActiveDevices, FieldValue::Int(v)) => self.active_devices = *v,
                (field, value) => {
                    anyhow::bail!("type mismatch for {}: {:?}", field.column(), value)
                }
            }
        }
        Ok(())
    }
}
