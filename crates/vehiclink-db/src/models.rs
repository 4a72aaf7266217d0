//! Database row types. These map directly to SQLite rows.
//! Distinct from vehiclink-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub vehicle_name: String,
    pub vehicle_number: String,
    pub password: String,
    pub created_at: String,
}

pub struct NewUser<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub name: &'a str,
    pub vehicle_name: &'a str,
    pub vehicle_number: &'a str,
    pub password_hash: &'a str,
}

/// Result of [`crate::Database::register_user`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    EmailTaken,
    VehicleTaken,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    pub seen: bool,
    pub created_at: String,
}

/// A message joined with the display names of both parties.
pub struct InboxRow {
    pub message: MessageRow,
    pub sender_name: String,
    pub receiver_name: String,
}
