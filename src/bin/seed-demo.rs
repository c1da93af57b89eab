//! Seeds a fresh database with the default milestone catalog and the
//! super admin account.
//!
//! Usage:
//!   DATABASE_URL=... ./seed-demo --username admin --password 'ChangeMe123!'

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

#[derive(Parser)]
#[command(about = "Seed the milestone catalog and super admin account")]
struct Args {
    /// Super admin username
    #[arg(long, default_value = "admin")]
    username: String,

    /// Super admin password (generated and printed when omitted)
    #[arg(long)]
    password: Option<String>,

    /// Recreate the milestone catalog even if milestones already exist
    #[arg(long)]
    force: bool,
}

/// The default discipleship catalog. Stage 18 is the attendance-driven
/// milestone auto-completed after the configured number of Sundays.
const DEFAULT_MILESTONES: &[(i32, &str, &str, bool)] = &[
    (1, "Salvation & Assurance", "Salvation", false),
    (2, "Water Baptism", "Baptism", false),
    (3, "Holy Spirit Baptism", "Holy Spirit", false),
    (4, "Personal Devotion Guide", "Devotion", false),
    (5, "Introduction to Prayer", "Prayer", false),
    (6, "Introduction to the Bible", "Bible", false),
    (7, "Christian Character", "Character", false),
    (8, "Joined a Small Group", "Small Group", false),
    (9, "Christian Giving", "Giving", false),
    (10, "Evangelism Basics", "Evangelism", false),
    (11, "First Timer Follow-up", "Follow-up", false),
    (12, "Membership Class", "Membership", false),
    (13, "Serving in a Ministry", "Serving", false),
    (14, "Discipleship Class 1", "Class 1", false),
    (15, "Discipleship Class 2", "Class 2", false),
    (16, "Discipleship Class 3", "Class 3", false),
    (17, "Mentorship Assigned", "Mentorship", false),
    (18, "Regular Sunday Attendance", "Attendance", true),
];

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL required")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    shepherd_api::db::run_migrations(&pool).await?;

    println!("=== Seed shepherd-api ===");

    // 1. Milestone catalog
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM milestones")
        .fetch_one(&pool)
        .await?;
    if existing > 0 && !args.force {
        println!("Milestones already present ({existing}), skipping catalog (use --force to reseed)");
    } else {
        if args.force {
            sqlx::query("DELETE FROM milestones")
                .execute(&pool)
                .await
                .context("Failed to clear milestones")?;
        }
        for (stage_number, stage_name, short_name, auto) in DEFAULT_MILESTONES {
            sqlx::query(
                "INSERT INTO milestones (stage_number, stage_name, short_name, is_auto_calculated)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (stage_number) DO NOTHING",
            )
            .bind(stage_number)
            .bind(stage_name)
            .bind(short_name)
            .bind(auto)
            .execute(&pool)
            .await?;
        }
        println!("Seeded {} milestones", DEFAULT_MILESTONES.len());
    }

    // 2. Super admin account
    let (password, generated) = match args.password {
        Some(p) => (p, false),
        None => (random_password(16), true),
    };
    if password.len() < 8 {
        anyhow::bail!("Password must be at least 8 characters");
    }
    let password_hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)?;
    let inserted = sqlx::query(
        "INSERT INTO users (username, password_hash, first_name, last_name, role)
         VALUES ($1, $2, 'Super', 'Admin', 'superadmin')
         ON CONFLICT (username) DO NOTHING",
    )
    .bind(args.username.to_lowercase())
    .bind(password_hash)
    .execute(&pool)
    .await?;

    if inserted.rows_affected() > 0 {
        println!("Created super admin account \"{}\"", args.username.to_lowercase());
        if generated {
            println!("Generated password: {password}");
        }
    } else {
        println!("Super admin account \"{}\" already exists", args.username.to_lowercase());
    }

    println!("Done.");
    Ok(())
}

fn random_password(len: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
