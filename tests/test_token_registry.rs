//! Integration tests for the token registry lifecycle: TTL eviction,
//! migration short-circuit, and pipeline teardown ordering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use w4rden::registry::PipelineSpawner;
use w4rden::{FeedConfig, MigrationDetector, RelationEngine, TokenRegistry};

fn feed_config() -> FeedConfig {
    FeedConfig {
        endpoint: "http://primary:10000".to_string(),
        backup_endpoint: "http://backup:10000".to_string(),
        x_token: None,
    }
}

/// Pipeline stub that parks forever; aborting it flips the paired flag.
fn stub_spawner() -> (PipelineSpawner, Arc<AtomicBool>) {
    struct AbortFlag(Arc<AtomicBool>);
    impl Drop for AbortFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    let destroyed = Arc::new(AtomicBool::new(false));
    let flag = destroyed.clone();
    let spawner: PipelineSpawner = Arc::new(move |_mint| {
        let guard = AbortFlag(flag.clone());
        tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        })
    });
    (spawner, destroyed)
}

fn registry(ttl: Duration, spawner: PipelineSpawner) -> TokenRegistry {
    TokenRegistry::new(ttl, Arc::new(RelationEngine::new(3)), None, spawner)
}

fn detector() -> MigrationDetector {
    MigrationDetector::new(feed_config(), "migrationProgram111".to_string(), Duration::from_secs(3600))
}

async fn wait_for(flag: &AtomicBool) -> bool {
    for _ in 0..100 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::task::yield_now().await;
    }
    flag.load(Ordering::SeqCst)
}

#[tokio::test(start_paused = true)]
async fn token_expires_after_ttl() {
    let (spawner, destroyed) = stub_spawner();
    let registry = registry(Duration::from_secs(60), spawner);
    let migration = detector();

    registry.add_token("mintA").await;
    assert!(registry.contains("mintA").await);

    // sweeps before the deadline keep the token
    tokio::time::advance(Duration::from_secs(30)).await;
    registry.sweep_once(&migration).await;
    assert!(registry.contains("mintA").await);
    assert!(!destroyed.load(Ordering::SeqCst));

    // and the first sweep past it retires the token
    tokio::time::advance(Duration::from_secs(31)).await;
    registry.sweep_once(&migration).await;
    assert!(!registry.contains("mintA").await);
    assert!(wait_for(&destroyed).await, "pipeline was not destroyed");
}

#[tokio::test(start_paused = true)]
async fn migration_short_circuits_ttl() {
    let (spawner, destroyed) = stub_spawner();
    let registry = registry(Duration::from_secs(3600), spawner);
    let migration = detector();

    registry.add_token("mintApump").await;
    migration.mark_migrated("mintApump").await;

    // TTL is nowhere near lapsed, migration wins anyway
    registry.sweep_once(&migration).await;
    assert!(!registry.contains("mintApump").await);
    assert!(wait_for(&destroyed).await, "pipeline was not destroyed");
}

#[tokio::test(start_paused = true)]
async fn adding_is_idempotent_and_removal_tolerates_absence() {
    let (spawner, _destroyed) = stub_spawner();
    let registry = registry(Duration::from_secs(60), spawner);

    registry.add_token("mintA").await;
    registry.add_token("mintA").await;
    assert_eq!(registry.tracked_count().await, 1);

    registry.remove_token("mintA").await;
    assert_eq!(registry.tracked_count().await, 0);
    // removing again is a no-op, not an error
    registry.remove_token("mintA").await;
    registry.remove_token("neverTracked").await;
}

#[tokio::test(start_paused = true)]
async fn explicit_removal_destroys_the_pipeline() {
    let (spawner, destroyed) = stub_spawner();
    let registry = registry(Duration::from_secs(60), spawner);

    registry.add_token("mintA").await;
    registry.remove_token("mintA").await;
    assert!(wait_for(&destroyed).await, "pipeline was not destroyed");
}

#[tokio::test(start_paused = true)]
async fn unmigrated_tokens_survive_sweeps() {
    let (spawner, destroyed) = stub_spawner();
    let registry = registry(Duration::from_secs(120), spawner);
    let migration = detector();
    migration.mark_migrated("someOtherMintpump").await;

    registry.add_token("mintA").await;
    for _ in 0..5 {
        tokio::time::advance(Duration::from_secs(1)).await;
        registry.sweep_once(&migration).await;
    }
    assert!(registry.contains("mintA").await);
    assert!(!destroyed.load(Ordering::SeqCst));
}
