use crate::models::{InboxRow, MessageRow, NewUser, Registration, UserRow};
use crate::Database;
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str =
    "id, email, name, vehicle_name, vehicle_number, password, created_at";

impl Database {
    // -- Users --

    /// Insert a user unless the email or vehicle number is already taken.
    /// The checks and the insert run under one lock and one transaction, so
    /// concurrent sign-ups for the same email cannot both get through.
    pub fn register_user(&self, user: &NewUser<'_>) -> Result<Registration> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if tx.prepare("SELECT 1 FROM users WHERE email = ?1")?.exists([user.email])? {
                return Ok(Registration::EmailTaken);
            }
            if tx
                .prepare("SELECT 1 FROM users WHERE vehicle_number = ?1")?
                .exists([user.vehicle_number])?
            {
                return Ok(Registration::VehicleTaken);
            }

            tx.execute(
                "INSERT INTO users (id, email, name, vehicle_name, vehicle_number, password)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    user.id,
                    user.email,
                    user.name,
                    user.vehicle_name,
                    user.vehicle_number,
                    user.password_hash,
                ],
            )?;

            tx.commit()?;
            Ok(Registration::Created)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_vehicle_number(&self, vehicle_number: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "vehicle_number", vehicle_number))
    }

    /// Returns how many of the given ids belong to existing users.
    pub fn count_existing_users(&self, ids: &[&str]) -> Result<usize> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT 1 FROM users WHERE id = ?1")?;
            let mut found = 0;
            for id in ids {
                if stmt.exists([id])? {
                    found += 1;
                }
            }
            Ok(found)
        })
    }

    // -- Messages --

    /// Stores a new unseen message and returns its `created_at` stamp.
    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        text: &str,
    ) -> Result<String> {
        let created_at = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, sender_id, receiver_id, text, &created_at],
            )?;
            Ok(())
        })?;
        Ok(created_at)
    }

    /// Marks everything `other_id` sent to `viewer_id` as seen, then returns the
    /// whole conversation oldest-first. Both steps share one transaction.
    ///
    /// Returns the number of messages that flipped to seen alongside the rows.
    pub fn open_conversation(
        &self,
        viewer_id: &str,
        other_id: &str,
    ) -> Result<(usize, Vec<MessageRow>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let marked = tx.execute(
                "UPDATE messages SET seen = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND seen = 0",
                (other_id, viewer_id),
            )?;

            let rows = query_conversation(&tx, viewer_id, other_id)?;

            tx.commit()?;
            Ok((marked, rows))
        })
    }

    /// Every message the user sent or received, newest-first, with both
    /// parties' names joined in.
    pub fn get_inbox_messages(&self, user_id: &str) -> Result<Vec<InboxRow>> {
        self.with_conn(|conn| {
            // JOIN users twice to fetch both names in a single query
            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender_id, m.receiver_id, m.text, m.seen, m.created_at,
                        s.name, r.name
                 FROM messages m
                 LEFT JOIN users s ON m.sender_id = s.id
                 LEFT JOIN users r ON m.receiver_id = r.id
                 WHERE m.sender_id = ?1 OR m.receiver_id = ?1
                 ORDER BY m.created_at DESC, m.rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(InboxRow {
                        message: message_from_row(row)?,
                        sender_name: row
                            .get::<_, Option<String>>(6)?
                            .unwrap_or_else(|| "unknown".to_string()),
                        receiver_name: row
                            .get::<_, Option<String>>(7)?
                            .unwrap_or_else(|| "unknown".to_string()),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Health --

    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }
}

/// Current time in the stored format (RFC 3339, UTC, milliseconds), which
/// sorts lexically in chronological order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always one of the fixed names above, never user input.
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                vehicle_name: row.get(3)?,
                vehicle_number: row.get(4)?,
                password: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_conversation(conn: &Connection, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, receiver_id, text, seen, created_at
         FROM messages
         WHERE (sender_id = ?1 AND receiver_id = ?2)
            OR (sender_id = ?2 AND receiver_id = ?1)
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt
        .query_map((user_a, user_b), message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        seen: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn add_user(db: &Database, email: &str, vehicle_number: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let outcome = db
            .register_user(&NewUser {
                id: &id,
                email,
                name: email.split('@').next().unwrap(),
                vehicle_name: "Swift",
                vehicle_number,
                password_hash: "hash",
            })
            .unwrap();
        assert_eq!(outcome, Registration::Created);
        id
    }

    fn send(db: &Database, from: &str, to: &str, text: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_message(&id, from, to, text).unwrap();
        id
    }

    #[test]
    fn users_are_found_by_each_unique_key() {
        let db = Database::open_in_memory().unwrap();
        let id = add_user(&db, "asha@example.com", "KA01AB1234");

        let by_email = db.get_user_by_email("asha@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, id);
        assert_eq!(by_email.name, "asha");

        let by_vehicle = db.get_user_by_vehicle_number("KA01AB1234").unwrap().unwrap();
        assert_eq!(by_vehicle.email, "asha@example.com");

        assert!(db.get_user_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_or_vehicle_number_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        add_user(&db, "asha@example.com", "KA01AB1234");

        let dup_email = db.register_user(&NewUser {
            id: "x",
            email: "asha@example.com",
            name: "other",
            vehicle_name: "Alto",
            vehicle_number: "KA02CD5678",
            password_hash: "hash",
        });
        assert_eq!(dup_email.unwrap(), Registration::EmailTaken);

        let dup_vehicle = db.register_user(&NewUser {
            id: "y",
            email: "ravi@example.com",
            name: "ravi",
            vehicle_name: "Alto",
            vehicle_number: "KA01AB1234",
            password_hash: "hash",
        });
        assert_eq!(dup_vehicle.unwrap(), Registration::VehicleTaken);

        // Neither rejected row was written
        assert!(db.get_user_by_email("ravi@example.com").unwrap().is_none());
        assert_eq!(db.count_existing_users(&["x", "y"]).unwrap(), 0);
    }

    #[test]
    fn message_to_unknown_user_violates_foreign_key() {
        let db = Database::open_in_memory().unwrap();
        let asha = add_user(&db, "asha@example.com", "KA01AB1234");

        let result = db.insert_message("m1", &asha, "missing-user", "hello");
        assert!(result.is_err());
    }

    #[test]
    fn count_existing_users_ignores_unknown_ids() {
        let db = Database::open_in_memory().unwrap();
        let asha = add_user(&db, "asha@example.com", "KA01AB1234");

        assert_eq!(db.count_existing_users(&[asha.as_str(), "ghost"]).unwrap(), 1);
        assert_eq!(db.count_existing_users(&[asha.as_str(), asha.as_str()]).unwrap(), 2);
    }

    #[test]
    fn opening_a_conversation_marks_only_incoming_messages_seen() {
        let db = Database::open_in_memory().unwrap();
        let asha = add_user(&db, "asha@example.com", "KA01AB1234");
        let ravi = add_user(&db, "ravi@example.com", "KA02CD5678");
        let meera = add_user(&db, "meera@example.com", "KA03EF9012");

        send(&db, &asha, &ravi, "first");
        send(&db, &ravi, &asha, "second");
        send(&db, &asha, &ravi, "third");
        send(&db, &meera, &ravi, "elsewhere");

        let (marked, rows) = db.open_conversation(&ravi, &asha).unwrap();
        assert_eq!(marked, 2);

        let texts: Vec<_> = rows.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, ["first", "second", "third"]);

        // ravi's own message to asha stays unseen until asha opens the chat
        assert!(rows[0].seen);
        assert!(!rows[1].seen);
        assert!(rows[2].seen);

        let (marked_again, rows_again) = db.open_conversation(&ravi, &asha).unwrap();
        assert_eq!(marked_again, 0);
        assert_eq!(rows_again.len(), 3);

        let meera_rows = db.get_inbox_messages(&meera).unwrap();
        assert_eq!(meera_rows.len(), 1);
        assert!(!meera_rows[0].message.seen);
    }

    #[test]
    fn inbox_rows_are_newest_first_with_names() {
        let db = Database::open_in_memory().unwrap();
        let asha = add_user(&db, "asha@example.com", "KA01AB1234");
        let ravi = add_user(&db, "ravi@example.com", "KA02CD5678");

        send(&db, &asha, &ravi, "old");
        send(&db, &ravi, &asha, "new");

        let rows = db.get_inbox_messages(&asha).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].message.text, "new");
        assert_eq!(rows[0].sender_name, "ravi");
        assert_eq!(rows[0].receiver_name, "asha");
        assert_eq!(rows[1].message.text, "old");
    }

    #[test]
    fn timestamps_sort_lexically() {
        let earlier = now_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let later = now_timestamp();
        assert!(earlier < later);
        assert!(earlier.ends_with('Z'));
    }

    #[test]
    fn ping_succeeds_on_open_database() {
        let db = Database::open_in_memory().unwrap();
        db.ping().unwrap();
    }
}
