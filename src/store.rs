use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

use crate::models::{
    NewUser, ProfileFields, ProfilePatch, SessionRecord, StudentProfile, UserPatch, UserRecord,
};
use crate::Error;

pub type SharedStore = Arc<dyn Store>;

/// Persistence contract for identities, student profiles and sessions.
///
/// All operations are atomic at the single-record level;
/// `create_student_with_profile` is the one multi-record operation and runs
/// in a single transaction.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, id: i32) -> Result<Option<UserRecord>, Error>;

    /// Exact-match lookup, used for login and duplicate-registration checks.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, Error>;

    async fn get_user_by_google_id(&self, google_id: &str) -> Result<Option<UserRecord>, Error>;

    /// Fails with `UserAlreadyExists` when a unique column (email, google id)
    /// is already taken, including under concurrent registration races.
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, Error>;

    async fn update_user(&self, id: i32, patch: UserPatch) -> Result<UserRecord, Error>;

    async fn create_student_with_profile(
        &self,
        user: NewUser,
        profile: ProfileFields,
    ) -> Result<(UserRecord, StudentProfile), Error>;

    async fn get_student_profile(&self, user_id: i32) -> Result<Option<StudentProfile>, Error>;

    async fn update_student_profile(
        &self,
        user_id: i32,
        patch: ProfilePatch,
    ) -> Result<StudentProfile, Error>;

    async fn insert_session(&self, session: &SessionRecord) -> Result<(), Error>;

    async fn get_session(&self, ssid: &str) -> Result<Option<SessionRecord>, Error>;

    /// Idempotent: deleting an absent session is not an error.
    async fn delete_session(&self, ssid: &str) -> Result<(), Error>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

fn conflict_on_unique(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            Error::UserAlreadyExists {
                message: "User already exists".to_string(),
            }
        }
        _ => Error::from(err),
    }
}

fn user_not_found(id: i32) -> Error {
    Error::NotFound {
        message: format!("User with id `{}` does not exist!", id),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, id: i32) -> Result<Option<UserRecord>, Error> {
        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, Error> {
        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE email = $1 LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(user)
    }

    async fn get_user_by_google_id(&self, google_id: &str) -> Result<Option<UserRecord>, Error> {
        let user =
            sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE google_id = $1 LIMIT 1")
                .bind(google_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::from)?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, Error> {
        let created = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (email, password_hash, name, profile_image_url, role, google_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.profile_image_url)
        .bind(user.role)
        .bind(&user.google_id)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_on_unique)?;
        Ok(created)
    }

    async fn update_user(&self, id: i32, patch: UserPatch) -> Result<UserRecord, Error> {
        let updated = sqlx::query_as::<_, UserRecord>(
            "UPDATE users SET \
                 name = COALESCE($2, name), \
                 password_hash = COALESCE($3, password_hash), \
                 profile_image_url = COALESCE($4, profile_image_url), \
                 google_id = COALESCE($5, google_id) \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.password_hash)
        .bind(&patch.profile_image_url)
        .bind(&patch.google_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conflict_on_unique)?;
        updated.ok_or_else(|| user_not_found(id))
    }

    async fn create_student_with_profile(
        &self,
        user: NewUser,
        profile: ProfileFields,
    ) -> Result<(UserRecord, StudentProfile), Error> {
        let mut tx = self.pool.begin().await.map_err(Error::from)?;

        let created = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (email, password_hash, name, profile_image_url, role, google_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.profile_image_url)
        .bind(user.role)
        .bind(&user.google_id)
        .fetch_one(&mut tx)
        .await
        .map_err(conflict_on_unique)?;

        let created_profile = sqlx::query_as::<_, StudentProfile>(
            "INSERT INTO student_profiles (user_id, phone, college, year_of_study, location) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(created.id)
        .bind(&profile.phone)
        .bind(&profile.college)
        .bind(&profile.year_of_study)
        .bind(&profile.location)
        .fetch_one(&mut tx)
        .await
        .map_err(Error::from)?;

        tx.commit().await.map_err(Error::from)?;
        Ok((created, created_profile))
    }

    async fn get_student_profile(&self, user_id: i32) -> Result<Option<StudentProfile>, Error> {
        let profile = sqlx::query_as::<_, StudentProfile>(
            "SELECT * FROM student_profiles WHERE user_id = $1 LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(profile)
    }

    async fn update_student_profile(
        &self,
        user_id: i32,
        patch: ProfilePatch,
    ) -> Result<StudentProfile, Error> {
        let updated = sqlx::query_as::<_, StudentProfile>(
            "UPDATE student_profiles SET \
                 phone = COALESCE($2, phone), \
                 college = COALESCE($3, college), \
                 year_of_study = COALESCE($4, year_of_study), \
                 location = COALESCE($5, location) \
             WHERE user_id = $1 RETURNING *",
        )
        .bind(user_id)
        .bind(&patch.phone)
        .bind(&patch.college)
        .bind(&patch.year_of_study)
        .bind(&patch.location)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from)?;
        updated.ok_or_else(|| Error::NotFound {
            message: format!("No student profile for user `{}`!", user_id),
        })
    }

    async fn insert_session(&self, session: &SessionRecord) -> Result<(), Error> {
        sqlx::query("INSERT INTO user_sessions (ssid, sess, expires_at) VALUES ($1, $2, $3)")
            .bind(&session.ssid)
            .bind(&session.sess)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn get_session(&self, ssid: &str) -> Result<Option<SessionRecord>, Error> {
        let session = sqlx::query_as::<_, SessionRecord>(
            "SELECT * FROM user_sessions WHERE ssid = $1 LIMIT 1",
        )
        .bind(ssid)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(session)
    }

    async fn delete_session(&self, ssid: &str) -> Result<(), Error> {
        sqlx::query("DELETE FROM user_sessions WHERE ssid = $1")
            .bind(ssid)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
pub use mem::MemStore;

#[cfg(test)]
mod mem {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory twin of [`PgStore`] with the same uniqueness semantics,
    /// for driving the orchestration and session logic in tests.
    pub struct MemStore {
        inner: Mutex<Inner>,
    }

    #[derive(Default)]
    struct Inner {
        next_user_id: i32,
        next_profile_id: i32,
        users: Vec<UserRecord>,
        profiles: Vec<StudentProfile>,
        sessions: HashMap<String, SessionRecord>,
    }

    impl MemStore {
        pub fn new() -> Self {
            Self {
                inner: Mutex::new(Inner::default()),
            }
        }

        pub fn user_count(&self) -> usize {
            self.inner.lock().unwrap().users.len()
        }

        pub fn profile_count(&self) -> usize {
            self.inner.lock().unwrap().profiles.len()
        }

        pub fn session_count(&self) -> usize {
            self.inner.lock().unwrap().sessions.len()
        }
    }

    fn duplicate() -> Error {
        Error::UserAlreadyExists {
            message: "User already exists".to_string(),
        }
    }

    impl Inner {
        fn insert_user(&mut self, user: NewUser) -> Result<UserRecord, Error> {
            if self.users.iter().any(|u| u.email == user.email) {
                return Err(duplicate());
            }
            if let Some(gid) = &user.google_id {
                if self.users.iter().any(|u| u.google_id.as_ref() == Some(gid)) {
                    return Err(duplicate());
                }
            }
            self.next_user_id += 1;
            let record = UserRecord {
                id: self.next_user_id,
                email: user.email,
                password_hash: user.password_hash,
                name: user.name,
                profile_image_url: user.profile_image_url,
                role: user.role,
                google_id: user.google_id,
                created_at: Utc::now(),
            };
            self.users.push(record.clone());
            Ok(record)
        }
    }

    #[async_trait]
    impl Store for MemStore {
        async fn get_user(&self, id: i32) -> Result<Option<UserRecord>, Error> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.users.iter().find(|u| u.id == id).cloned())
        }

        async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, Error> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.users.iter().find(|u| u.email == email).cloned())
        }

        async fn get_user_by_google_id(
            &self,
            google_id: &str,
        ) -> Result<Option<UserRecord>, Error> {
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .users
                .iter()
                .find(|u| u.google_id.as_deref() == Some(google_id))
                .cloned())
        }

        async fn create_user(&self, user: NewUser) -> Result<UserRecord, Error> {
            let mut inner = self.inner.lock().unwrap();
            inner.insert_user(user)
        }

        async fn update_user(&self, id: i32, patch: UserPatch) -> Result<UserRecord, Error> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(gid) = &patch.google_id {
                if inner
                    .users
                    .iter()
                    .any(|u| u.id != id && u.google_id.as_ref() == Some(gid))
                {
                    return Err(duplicate());
                }
            }
            let user = inner
                .users
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or_else(|| user_not_found(id))?;
            if let Some(name) = patch.name {
                user.name = name;
            }
            if let Some(hash) = patch.password_hash {
                user.password_hash = Some(hash);
            }
            if let Some(url) = patch.profile_image_url {
                user.profile_image_url = Some(url);
            }
            if let Some(gid) = patch.google_id {
                user.google_id = Some(gid);
            }
            Ok(user.clone())
        }

        async fn create_student_with_profile(
            &self,
            user: NewUser,
            profile: ProfileFields,
        ) -> Result<(UserRecord, StudentProfile), Error> {
            let mut inner = self.inner.lock().unwrap();
            let created = inner.insert_user(user)?;
            inner.next_profile_id += 1;
            let created_profile = StudentProfile {
                id: inner.next_profile_id,
                user_id: created.id,
                phone: profile.phone,
                college: profile.college,
                year_of_study: profile.year_of_study,
                location: profile.location,
            };
            inner.profiles.push(created_profile.clone());
            Ok((created, created_profile))
        }

        async fn get_student_profile(
            &self,
            user_id: i32,
        ) -> Result<Option<StudentProfile>, Error> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.profiles.iter().find(|p| p.user_id == user_id).cloned())
        }

        async fn update_student_profile(
            &self,
            user_id: i32,
            patch: ProfilePatch,
        ) -> Result<StudentProfile, Error> {
            let mut inner = self.inner.lock().unwrap();
            let profile = inner
                .profiles
                .iter_mut()
                .find(|p| p.user_id == user_id)
                .ok_or_else(|| Error::NotFound {
                    message: format!("No student profile for user `{}`!", user_id),
                })?;
            if let Some(phone) = patch.phone {
                profile.phone = phone;
            }
            if let Some(college) = patch.college {
                profile.college = college;
            }
            if let Some(year) = patch.year_of_study {
                profile.year_of_study = year;
            }
            if let Some(location) = patch.location {
                profile.location = location;
            }
            Ok(profile.clone())
        }

        async fn insert_session(&self, session: &SessionRecord) -> Result<(), Error> {
            let mut inner = self.inner.lock().unwrap();
            inner
                .sessions
                .insert(session.ssid.clone(), session.clone());
            Ok(())
        }

        async fn get_session(&self, ssid: &str) -> Result<Option<SessionRecord>, Error> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.sessions.get(ssid).cloned())
        }

        async fn delete_session(&self, ssid: &str) -> Result<(), Error> {
            let mut inner = self.inner.lock().unwrap();
            inner.sessions.remove(ssid);
            Ok(())
        }
    }
}
