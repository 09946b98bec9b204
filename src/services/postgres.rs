use crate::core::{DiscoveryScope, OrderField, PageWindow, ProfileFilter};
use crate::models::{Account, AccountId, Group, Owner, Permission, Profile, ProfileRecord};
use crate::services::store::{
    AccountChanges, GroupChanges, IdentityStore, Listing, NewAccount, NewGroup, NewPermission,
    PermissionChanges, ProfileChanges, ProfileStore, StoreError, StoreResult,
};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use std::time::Duration;

const PROFILE_COLUMNS: &str = r#"
    p.account_id, p.photo, p.gender, p.phone_number, p.height, p.weight,
    p.address_line1, p.address_line2, p.city, p.state, p.country, p.postal_code,
    p.father_name, p.mother_name, p.siblings, p.family_type, p.family_status,
    p.bio, p.created_at, p.updated_at
"#;

const OWNER_COLUMNS: &str = r#"
    a.username, a.email, a.first_name, a.last_name,
    ARRAY(
        SELECT i.target_id FROM profile_interests i
        WHERE i.source_id = p.account_id
        ORDER BY i.target_id
    ) AS interests
"#;

const ACCOUNT_COLUMNS: &str = r#"
    a.id, a.username, a.email, a.first_name, a.last_name, a.password_hash,
    a.is_active, a.is_staff, a.is_superuser, a.date_joined, a.token_version,
    ARRAY(
        SELECT g.group_id FROM account_groups g
        WHERE g.account_id = a.id
        ORDER BY g.group_id
    ) AS groups
"#;

/// Partial unique index on non-blank account emails
const EMAIL_INDEX: &str = "accounts_email_key";

/// Map unique/foreign-key violations to domain errors
fn constraint_error(err: sqlx::Error, conflict: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("23505") if db.constraint() == Some(EMAIL_INDEX) => return StoreError::EmailTaken,
            Some("23505") => return StoreError::Conflict(conflict.to_string()),
            Some("23503") => {
                return StoreError::NotFound(db.constraint().unwrap_or("referenced row").to_string())
            }
            _ => {}
        }
    }
    StoreError::SqlxError(err)
}

fn parse_enum<T: std::str::FromStr<Err = String>>(value: Option<String>) -> StoreResult<Option<T>> {
    match value.as_deref() {
        None | Some("") => Ok(None),
        Some(v) => v.parse().map(Some).map_err(StoreError::InvalidData),
    }
}

fn profile_from_row(row: &PgRow) -> StoreResult<Profile> {
    Ok(Profile {
        account_id: row.try_get("account_id")?,
        photo: row.try_get("photo")?,
        gender: parse_enum(row.try_get("gender")?)?,
        phone_number: row.try_get("phone_number")?,
        height: row.try_get("height")?,
        weight: row.try_get("weight")?,
        address_line1: row.try_get("address_line1")?,
        address_line2: row.try_get("address_line2")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        country: row.try_get("country")?,
        postal_code: row.try_get("postal_code")?,
        father_name: row.try_get("father_name")?,
        mother_name: row.try_get("mother_name")?,
        siblings: row.try_get("siblings")?,
        family_type: parse_enum(row.try_get("family_type")?)?,
        family_status: parse_enum(row.try_get("family_status")?)?,
        bio: row.try_get("bio")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn record_from_row(row: &PgRow) -> StoreResult<ProfileRecord> {
    Ok(ProfileRecord {
        profile: profile_from_row(row)?,
        owner: Owner {
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
        },
        interests: row.try_get("interests")?,
    })
}

fn account_from_row(row: &PgRow) -> StoreResult<Account> {
    Ok(Account {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        password_hash: row.try_get("password_hash")?,
        is_active: row.try_get("is_active")?,
        is_staff: row.try_get("is_staff")?,
        is_superuser: row.try_get("is_superuser")?,
        date_joined: row.try_get("date_joined")?,
        token_version: row.try_get("token_version")?,
        groups: row.try_get("groups")?,
    })
}

fn permission_from_row(row: &PgRow) -> StoreResult<Permission> {
    Ok(Permission {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        codename: row.try_get("codename")?,
        content_type: row.try_get("content_type")?,
    })
}

/// Append the discovery scope and narrowing filters as a WHERE clause
fn push_conditions<'a>(builder: &mut QueryBuilder<'a, Postgres>, scope: &DiscoveryScope, filter: &'a ProfileFilter) {
    builder.push(" WHERE TRUE");

    if let DiscoveryScope::Excluding { account_id, gender } = scope {
        builder.push(" AND p.account_id <> ").push_bind(*account_id);
        if let Some(g) = gender {
            builder
                .push(" AND p.gender IS DISTINCT FROM ")
                .push_bind(g.as_str());
        }
    }

    if let Some(g) = filter.gender {
        builder.push(" AND p.gender = ").push_bind(g.as_str());
    }

    for (column, value) in [
        ("p.city", &filter.city),
        ("p.state", &filter.state),
        ("p.country", &filter.country),
    ] {
        if let Some(v) = value {
            builder.push(format!(" AND {} = ", column)).push_bind(v.as_str());
        }
    }
    for (column, value) in [
        ("p.city", &filter.city_contains),
        ("p.state", &filter.state_contains),
        ("p.country", &filter.country_contains),
    ] {
        if let Some(v) = value {
            builder
                .push(format!(" AND strpos(lower({}), lower(", column))
                .push_bind(v.as_str())
                .push(")) > 0");
        }
    }

    if let Some(t) = filter.family_type {
        builder.push(" AND p.family_type = ").push_bind(t.as_str());
    }
    if let Some(s) = filter.family_status {
        builder.push(" AND p.family_status = ").push_bind(s.as_str());
    }

    for (column, min, max) in [
        ("p.height", filter.height_min, filter.height_max),
        ("p.weight", filter.weight_min, filter.weight_max),
    ] {
        if let Some(v) = min {
            builder.push(format!(" AND {} >= ", column)).push_bind(v);
        }
        if let Some(v) = max {
            builder.push(format!(" AND {} <= ", column)).push_bind(v);
        }
    }

    if let Some(v) = filter.siblings {
        builder.push(" AND p.siblings = ").push_bind(v);
    }
    if let Some(v) = filter.siblings_min {
        builder.push(" AND p.siblings >= ").push_bind(v);
    }
    if let Some(v) = filter.siblings_max {
        builder.push(" AND p.siblings <= ").push_bind(v);
    }

    for term in filter.search_terms() {
        builder.push(" AND (");
        let mut fields = builder.separated(" OR ");
        for column in ["a.first_name", "a.last_name", "a.email", "p.city", "p.state", "p.bio"] {
            fields
                .push(format!("strpos(lower({}), lower(", column))
                .push_bind_unseparated(term)
                .push_unseparated(")) > 0");
        }
        builder.push(")");
    }
}

fn push_ordering(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProfileFilter) {
    let column = match filter.ordering.field {
        OrderField::CreatedAt => "p.created_at",
        OrderField::Height => "p.height",
        OrderField::Weight => "p.weight",
    };
    let direction = if filter.ordering.descending { "DESC" } else { "ASC" };
    builder.push(format!(
        " ORDER BY {} {}, p.created_at DESC, p.account_id DESC",
        column, direction
    ));
}

/// Write every profile column back, stamping `updated_at`
async fn write_profile(conn: &mut PgConnection, profile: &Profile) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE profiles SET
            photo = $2, gender = $3, phone_number = $4, height = $5, weight = $6,
            address_line1 = $7, address_line2 = $8, city = $9, state = $10,
            country = $11, postal_code = $12, father_name = $13, mother_name = $14,
            siblings = $15, family_type = $16, family_status = $17, bio = $18,
            updated_at = NOW()
        WHERE account_id = $1
        "#,
    )
    .bind(profile.account_id)
    .bind(&profile.photo)
    .bind(profile.gender.map(|g| g.as_str()))
    .bind(&profile.phone_number)
    .bind(profile.height)
    .bind(profile.weight)
    .bind(&profile.address_line1)
    .bind(&profile.address_line2)
    .bind(&profile.city)
    .bind(&profile.state)
    .bind(&profile.country)
    .bind(&profile.postal_code)
    .bind(&profile.father_name)
    .bind(&profile.mother_name)
    .bind(profile.siblings)
    .bind(profile.family_type.map(|t| t.as_str()))
    .bind(profile.family_status.map(|s| s.as_str()))
    .bind(&profile.bio)
    .execute(conn)
    .await?;

    Ok(())
}

async fn lock_profile(conn: &mut PgConnection, id: AccountId) -> StoreResult<Option<Profile>> {
    let query = format!(
        "SELECT {} FROM profiles p WHERE p.account_id = $1 FOR UPDATE",
        PROFILE_COLUMNS
    );
    sqlx::query(&query)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .as_ref()
        .map(profile_from_row)
        .transpose()
}

async fn email_taken_on(conn: &mut PgConnection, email: &str, except: Option<AccountId>) -> StoreResult<bool> {
    if email.is_empty() {
        return Ok(false);
    }
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = $1 AND id IS DISTINCT FROM $2)",
    )
    .bind(email)
    .bind(except)
    .fetch_one(conn)
    .await?;
    Ok(taken)
}

async fn insert_profile(conn: &mut PgConnection, id: AccountId, changes: &ProfileChanges) -> StoreResult<()> {
    sqlx::query("INSERT INTO profiles (account_id) VALUES ($1)")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| constraint_error(e, "Profile already exists"))?;

    let mut profile = lock_profile(&mut *conn, id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))?;
    changes.apply(&mut profile);
    write_profile(conn, &profile).await
}

async fn set_group_permissions(conn: &mut PgConnection, group_id: i64, permission_ids: &[i64]) -> StoreResult<()> {
    sqlx::query("DELETE FROM group_permissions WHERE group_id = $1")
        .bind(group_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "INSERT INTO group_permissions (group_id, permission_id)
         SELECT $1::BIGINT, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
    )
    .bind(group_id)
    .bind(permission_ids)
    .execute(conn)
    .await
    .map_err(|e| constraint_error(e, "duplicate permission"))?;
    Ok(())
}

async fn set_account_groups(conn: &mut PgConnection, account_id: AccountId, group_ids: &[i64]) -> StoreResult<()> {
    sqlx::query("DELETE FROM account_groups WHERE account_id = $1")
        .bind(account_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "INSERT INTO account_groups (account_id, group_id)
         SELECT $1::BIGINT, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
    )
    .bind(account_id)
    .bind(group_ids)
    .execute(conn)
    .await
    .map_err(|e| constraint_error(e, "duplicate group"))?;
    Ok(())
}

/// PostgreSQL-backed store for accounts, profiles and interest edges
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and run pending migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new store from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    async fn fetch_records(&self, builder: &mut QueryBuilder<'_, Postgres>) -> StoreResult<Vec<ProfileRecord>> {
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn assemble_groups(&self, rows: Vec<PgRow>) -> StoreResult<Vec<Group>> {
        let mut heads = Vec::with_capacity(rows.len());
        let mut all_ids: Vec<i64> = Vec::new();
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let name: String = row.try_get("name")?;
            let permission_ids: Vec<i64> = row.try_get("permission_ids")?;
            all_ids.extend(&permission_ids);
            heads.push((id, name, permission_ids));
        }

        let permissions: HashMap<i64, Permission> = sqlx::query(
            "SELECT id, name, codename, content_type FROM permissions WHERE id = ANY($1)",
        )
        .bind(&all_ids)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| permission_from_row(row).map(|p| (p.id, p)))
        .collect::<StoreResult<_>>()?;

        Ok(heads
            .into_iter()
            .map(|(id, name, ids)| Group {
                id,
                name,
                permissions: ids.iter().filter_map(|pid| permissions.get(pid).cloned()).collect(),
            })
            .collect())
    }

    async fn require_account(&self, id: AccountId) -> StoreResult<Account> {
        self.get_account(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("account {}", id)))
    }

    async fn require_profile(&self, id: AccountId) -> StoreResult<ProfileRecord> {
        self.get_profile(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))
    }

    async fn require_group(&self, id: i64) -> StoreResult<Group> {
        self.get_group(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("group {}", id)))
    }
}

#[async_trait]
impl ProfileStore for PostgresStore {
    async fn get_profile(&self, id: AccountId) -> StoreResult<Option<ProfileRecord>> {
        let query = format!(
            "SELECT {}, {} FROM profiles p JOIN accounts a ON a.id = p.account_id WHERE p.account_id = $1",
            PROFILE_COLUMNS, OWNER_COLUMNS
        );
        sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(record_from_row)
            .transpose()
    }

    async fn list_profiles(
        &self,
        scope: &DiscoveryScope,
        filter: &ProfileFilter,
        window: PageWindow,
    ) -> StoreResult<Listing<ProfileRecord>> {
        if *scope == DiscoveryScope::Nothing {
            return Ok(Listing::empty());
        }

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM profiles p JOIN accounts a ON a.id = p.account_id");
        push_conditions(&mut count, scope, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(format!(
            "SELECT {}, {} FROM profiles p JOIN accounts a ON a.id = p.account_id",
            PROFILE_COLUMNS, OWNER_COLUMNS
        ));
        push_conditions(&mut select, scope, filter);
        push_ordering(&mut select, filter);
        select
            .push(" LIMIT ")
            .push_bind(window.limit as i64)
            .push(" OFFSET ")
            .push_bind(window.offset as i64);

        let items = self.fetch_records(&mut select).await?;

        tracing::debug!("Listed {} of {} profiles", items.len(), total);

        Ok(Listing {
            items,
            total: total as u64,
        })
    }

    async fn has_interest(&self, source: AccountId, target: AccountId) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM profile_interests WHERE source_id = $1 AND target_id = $2)",
        )
        .bind(source)
        .bind(target)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn add_interest(&self, source: AccountId, target: AccountId) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO profile_interests (source_id, target_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(source)
        .bind(target)
        .execute(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "self-interest"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_interest(&self, source: AccountId, target: AccountId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM profile_interests WHERE source_id = $1 AND target_id = $2")
            .bind(source)
            .bind(target)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn toggle_interest(&self, source: AccountId, target: AccountId) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        // Serializes every toggle issued by the same viewer
        let locked = sqlx::query("SELECT account_id FROM profiles WHERE account_id = $1 FOR UPDATE")
            .bind(source)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("profile {}", source)));
        }

        let removed = sqlx::query("DELETE FROM profile_interests WHERE source_id = $1 AND target_id = $2")
            .bind(source)
            .bind(target)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if !removed {
            sqlx::query(
                "INSERT INTO profile_interests (source_id, target_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(source)
            .bind(target)
            .execute(&mut *tx)
            .await
            .map_err(|e| constraint_error(e, "self-interest"))?;
        }

        tx.commit().await?;

        Ok(!removed)
    }

    async fn list_interests(&self, source: AccountId, window: PageWindow) -> StoreResult<Listing<ProfileRecord>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profile_interests WHERE source_id = $1")
            .bind(source)
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::new(format!(
            "SELECT {}, {} FROM profile_interests e \
             JOIN profiles p ON p.account_id = e.target_id \
             JOIN accounts a ON a.id = p.account_id \
             WHERE e.source_id = ",
            PROFILE_COLUMNS, OWNER_COLUMNS
        ));
        select
            .push_bind(source)
            .push(" ORDER BY p.created_at DESC, p.account_id DESC LIMIT ")
            .push_bind(window.limit as i64)
            .push(" OFFSET ")
            .push_bind(window.offset as i64);

        let items = self.fetch_records(&mut select).await?;

        Ok(Listing {
            items,
            total: total as u64,
        })
    }

    async fn create_profile(&self, id: AccountId, changes: &ProfileChanges) -> StoreResult<ProfileRecord> {
        let mut tx = self.pool.begin().await?;
        insert_profile(&mut tx, id, changes).await?;
        tx.commit().await?;

        self.require_profile(id).await
    }

    async fn update_profile(&self, id: AccountId, changes: &ProfileChanges) -> StoreResult<ProfileRecord> {
        let mut tx = self.pool.begin().await?;
        let mut profile = lock_profile(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))?;
        changes.apply(&mut profile);
        write_profile(&mut tx, &profile).await?;
        tx.commit().await?;

        self.require_profile(id).await
    }

    async fn upsert_own_profile(
        &self,
        id: AccountId,
        account: &AccountChanges,
        profile: &ProfileChanges,
    ) -> StoreResult<ProfileRecord> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("account {}", id)));
        }

        if let Some(email) = &account.email {
            if email_taken_on(&mut tx, email, Some(id)).await? {
                return Err(StoreError::EmailTaken);
            }
        }

        sqlx::query(
            "UPDATE accounts SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email)
             WHERE id = $1",
        )
        .bind(id)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.email)
        .execute(&mut *tx)
        .await
        .map_err(|e| constraint_error(e, "Email already exists"))?;

        sqlx::query("INSERT INTO profiles (account_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let mut row = lock_profile(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))?;
        profile.apply(&mut row);
        write_profile(&mut tx, &row).await?;

        tx.commit().await?;

        self.require_profile(id).await
    }

    async fn delete_profile(&self, id: AccountId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE account_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl IdentityStore for PostgresStore {
    async fn create_account(&self, new: NewAccount, profile: Option<ProfileChanges>) -> StoreResult<Account> {
        let mut tx = self.pool.begin().await?;

        if email_taken_on(&mut tx, &new.email, None).await? {
            return Err(StoreError::EmailTaken);
        }

        let id: AccountId = sqlx::query_scalar(
            r#"
            INSERT INTO accounts
                (username, email, password_hash, first_name, last_name, is_active, is_staff, is_superuser)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.is_active)
        .bind(new.is_staff)
        .bind(new.is_superuser)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| constraint_error(e, "Account already exists"))?;

        if !new.group_ids.is_empty() {
            set_account_groups(&mut tx, id, &new.group_ids).await?;
        }
        if let Some(changes) = profile {
            insert_profile(&mut tx, id, &changes).await?;
        }

        tx.commit().await?;

        tracing::info!(account_id = id, "Created account");

        self.require_account(id).await
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let query = format!("SELECT {} FROM accounts a WHERE a.id = $1", ACCOUNT_COLUMNS);
        sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(account_from_row)
            .transpose()
    }

    async fn find_account_by_login(&self, login: &str) -> StoreResult<Option<Account>> {
        let query = format!(
            "SELECT {} FROM accounts a WHERE (a.email = $1 AND a.email <> '') OR a.username = $1 \
             ORDER BY (a.email = $1) DESC LIMIT 1",
            ACCOUNT_COLUMNS
        );
        sqlx::query(&query)
            .bind(login)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(account_from_row)
            .transpose()
    }

    async fn email_taken(&self, email: &str, except: Option<AccountId>) -> StoreResult<bool> {
        let mut conn = self.pool.acquire().await?;
        email_taken_on(&mut conn, email, except).await
    }

    async fn username_taken(&self, username: &str) -> StoreResult<bool> {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE username = $1)")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    async fn list_accounts(&self, window: PageWindow) -> StoreResult<Listing<Account>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await?;

        let query = format!(
            "SELECT {} FROM accounts a ORDER BY a.date_joined DESC, a.id DESC LIMIT $1 OFFSET $2",
            ACCOUNT_COLUMNS
        );
        let items = sqlx::query(&query)
            .bind(window.limit as i64)
            .bind(window.offset as i64)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(account_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Listing {
            items,
            total: total as u64,
        })
    }

    async fn update_account(&self, id: AccountId, changes: &AccountChanges) -> StoreResult<Account> {
        let mut tx = self.pool.begin().await?;

        let query = format!("SELECT {} FROM accounts a WHERE a.id = $1 FOR UPDATE", ACCOUNT_COLUMNS);
        let mut account = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(account_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(format!("account {}", id)))?;

        if let Some(email) = &changes.email {
            if email_taken_on(&mut tx, email, Some(id)).await? {
                return Err(StoreError::EmailTaken);
            }
        }

        changes.apply(&mut account);

        sqlx::query(
            r#"
            UPDATE accounts SET
                username = $2, email = $3, first_name = $4, last_name = $5,
                password_hash = $6, is_active = $7, is_staff = $8, is_superuser = $9,
                token_version = $10
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.password_hash)
        .bind(account.is_active)
        .bind(account.is_staff)
        .bind(account.is_superuser)
        .bind(account.token_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| constraint_error(e, "Username or email already exists"))?;

        if let Some(group_ids) = &changes.group_ids {
            set_account_groups(&mut tx, id, group_ids).await?;
        }

        tx.commit().await?;

        self.require_account(id).await
    }

    async fn delete_account(&self, id: AccountId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::info!(account_id = id, deleted = result.rows_affected(), "Deleted account");

        Ok(result.rows_affected() > 0)
    }

    async fn add_account_groups(&self, id: AccountId, group_ids: &[i64]) -> StoreResult<usize> {
        let result = sqlx::query(
            "INSERT INTO account_groups (account_id, group_id)
             SELECT $1::BIGINT, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(group_ids)
        .execute(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "duplicate group"))?;

        Ok(result.rows_affected() as usize)
    }

    async fn remove_account_groups(&self, id: AccountId, group_ids: &[i64]) -> StoreResult<usize> {
        let result = sqlx::query("DELETE FROM account_groups WHERE account_id = $1 AND group_id = ANY($2)")
            .bind(id)
            .bind(group_ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn missing_groups(&self, ids: &[i64]) -> StoreResult<Vec<i64>> {
        let missing: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT wanted FROM UNNEST($1::BIGINT[]) AS wanted
             WHERE NOT EXISTS (SELECT 1 FROM groups g WHERE g.id = wanted)
             ORDER BY wanted",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(missing)
    }

    async fn groups_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Group>> {
        let rows = sqlx::query(
            "SELECT g.id, g.name,
                    ARRAY(SELECT gp.permission_id FROM group_permissions gp
                          WHERE gp.group_id = g.id ORDER BY gp.permission_id) AS permission_ids
             FROM groups g WHERE g.id = ANY($1) ORDER BY g.id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        self.assemble_groups(rows).await
    }

    async fn list_groups(&self, window: PageWindow) -> StoreResult<Listing<Group>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM groups")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            "SELECT g.id, g.name,
                    ARRAY(SELECT gp.permission_id FROM group_permissions gp
                          WHERE gp.group_id = g.id ORDER BY gp.permission_id) AS permission_ids
             FROM groups g ORDER BY g.name LIMIT $1 OFFSET $2",
        )
        .bind(window.limit as i64)
        .bind(window.offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(Listing {
            items: self.assemble_groups(rows).await?,
            total: total as u64,
        })
    }

    async fn get_group(&self, id: i64) -> StoreResult<Option<Group>> {
        Ok(self.groups_by_ids(&[id]).await?.into_iter().next())
    }

    async fn create_group(&self, group: NewGroup) -> StoreResult<Group> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar("INSERT INTO groups (name) VALUES ($1) RETURNING id")
            .bind(&group.name)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| constraint_error(e, "group with this name already exists"))?;
        set_group_permissions(&mut tx, id, &group.permission_ids).await?;

        tx.commit().await?;

        self.require_group(id).await
    }

    async fn update_group(&self, id: i64, changes: &GroupChanges) -> StoreResult<Group> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE groups SET name = COALESCE($2, name) WHERE id = $1")
            .bind(id)
            .bind(&changes.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| constraint_error(e, "group with this name already exists"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("group {}", id)));
        }
        if let Some(ids) = &changes.permission_ids {
            set_group_permissions(&mut tx, id, ids).await?;
        }

        tx.commit().await?;

        self.require_group(id).await
    }

    async fn delete_group(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_permissions(&self, window: PageWindow) -> StoreResult<Listing<Permission>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM permissions")
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query(
            "SELECT id, name, codename, content_type FROM permissions ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(window.limit as i64)
        .bind(window.offset as i64)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(permission_from_row)
        .collect::<StoreResult<Vec<_>>>()?;

        Ok(Listing {
            items,
            total: total as u64,
        })
    }

    async fn get_permission(&self, id: i64) -> StoreResult<Option<Permission>> {
        sqlx::query("SELECT id, name, codename, content_type FROM permissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(permission_from_row)
            .transpose()
    }

    async fn create_permission(&self, permission: NewPermission) -> StoreResult<Permission> {
        let row = sqlx::query(
            "INSERT INTO permissions (name, codename, content_type) VALUES ($1, $2, $3)
             RETURNING id, name, codename, content_type",
        )
        .bind(&permission.name)
        .bind(&permission.codename)
        .bind(&permission.content_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "permission with this content type and codename already exists"))?;

        permission_from_row(&row)
    }

    async fn update_permission(&self, id: i64, changes: &PermissionChanges) -> StoreResult<Permission> {
        let row = sqlx::query(
            "UPDATE permissions SET
                name = COALESCE($2, name),
                codename = COALESCE($3, codename),
                content_type = COALESCE($4, content_type)
             WHERE id = $1
             RETURNING id, name, codename, content_type",
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.codename)
        .bind(&changes.content_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "permission with this content type and codename already exists"))?
        .ok_or_else(|| StoreError::NotFound(format!("permission {}", id)))?;

        permission_from_row(&row)
    }

    async fn delete_permission(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Health check for the database connection
    async fn health_check(&self) -> StoreResult<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}
