//! Reference data seeding: the default category and the logistics channel
//! table. Idempotent, safe to run on every startup.

use sqlx::PgPool;

use crate::categories::create_category;
use crate::DbError;

/// Seeds the default "Uncategorized" bucket and the logistics options.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any write fails.
pub async fn seed_reference_data(pool: &PgPool) -> Result<(), DbError> {
    create_category(pool, "Uncategorized", "uncategorized", true).await?;

    for option in dropsync_core::logistics::OPTIONS {
        let countries: Vec<String> = option.countries.iter().map(|c| (*c).to_owned()).collect();
        sqlx::query(
            "INSERT INTO logistics_options \
                 (id, name, min_days, max_days, express, sensitive_allowed, countries) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 min_days = EXCLUDED.min_days, \
                 max_days = EXCLUDED.max_days, \
                 express = EXCLUDED.express, \
                 sensitive_allowed = EXCLUDED.sensitive_allowed, \
                 countries = EXCLUDED.countries",
        )
        .bind(option.id)
        .bind(option.name)
        .bind(i32::try_from(option.min_days).unwrap_or(i32::MAX))
        .bind(i32::try_from(option.max_days).unwrap_or(i32::MAX))
        .bind(option.express)
        .bind(option.sensitive_allowed)
        .bind(&countries)
        .execute(pool)
        .await?;
    }

    Ok(())
}
