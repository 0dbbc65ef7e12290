//! Scripted walkthrough of the taskboard stores.
//!
//! ```text
//! TASKBOARD_LATENCY=none TASKBOARD_DATA_DIR=./data cargo run -p taskboard
//! ```

use anyhow::Context;
use taskboard::{App, Config, NewTask, TaskPriority, TaskStatus};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Taskboard ===\n");

    let app = App::from_config(config).await.context("failed to start")?;
    app.auth().wait_for_initialization().await;

    if let Some(user) = app.auth().current_user() {
        println!("Restored session for {}", user.email);
    } else {
        println!("Logging in as admin@example.com...");
        let outcome = app.auth().login("admin@example.com", "admin123").await?;
        anyhow::ensure!(outcome.is_success(), "seeded admin could not log in");
    }
    let user = app.auth().current_user().context("no user after login")?;

    let tasks = app.todos().list().await?;
    println!("\nTasks ({}):", tasks.len());
    for task in &tasks {
        println!("  #{:<3} [{:<11}] {:<6} {}", task.id, task.status, task.priority, task.title);
    }

    println!("\nCreating a task...");
    let task = app
        .todos()
        .create(
            NewTask::new("Review the release notes", TaskPriority::Medium).with_description("before Friday"),
            user.id,
        )
        .await?;
    println!("  created #{} \"{}\"", task.id, task.title);

    println!("Moving it to in-progress, then done...");
    app.todos().move_task(task.id, TaskStatus::InProgress).await?;
    app.todos().move_task(task.id, TaskStatus::Done).await?;

    let stats = app.todos().stats();
    println!(
        "\nStats: {} total, {} done, {} in progress, {} pending, {} high priority ({:.0}% complete)",
        stats.total, stats.completed, stats.in_progress, stats.pending, stats.high_priority, stats.completion_rate
    );

    println!("\nUsers (admin view):");
    match app.auth().all_users().await {
        Ok(users) => {
            for user in users {
                println!("  #{} {:<20} {:?} password={}", user.id, user.email, user.role, user.password);
            }
        },
        Err(error) => println!("  {error}"),
    }

    println!("\nNotifications:");
    for notification in app.notifications().notifications() {
        println!("  [{:<7}] {}", notification.severity, notification.message);
    }

    app.auth().logout().await?;
    println!("\nLogged out: authenticated = {}", app.auth().is_authenticated());

    app.shutdown().await?;
    Ok(())
}
