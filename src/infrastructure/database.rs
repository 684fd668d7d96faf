use crate::entities::{customers, files, projects};
use anyhow::Context;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

pub async fn setup_database(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt)
        .await
        .with_context(|| format!("connecting to {}", db_url))?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();

    if builder == DatabaseBackend::Postgres {
        info!("🔄 Running SQLx migrations for PostgreSQL...");
        sqlx::migrate!("./migrations")
            .run(db.get_postgres_connection_pool())
            .await?;
        return Ok(());
    }

    info!("🔄 Running SeaORM auto-migrations for SQLite/Other...");
    let schema = Schema::new(builder);

    // Parents first: files reference projects, projects reference customers.
    let stmts = vec![
        (
            "customers",
            schema
                .create_table_from_entity(customers::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "projects",
            schema
                .create_table_from_entity(projects::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "files",
            schema
                .create_table_from_entity(files::Entity)
                .if_not_exists()
                .to_owned(),
        ),
    ];

    for (name, stmt) in stmts {
        db.execute(builder.build(&stmt))
            .await
            .with_context(|| format!("creating table '{}'", name))?;
        info!("   - Table '{}' checked/created", name);
    }

    Ok(())
}
