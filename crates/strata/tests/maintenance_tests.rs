//! Maintenance loop tests on a paused tokio clock

use std::sync::Arc;
use std::time::Duration;

use strata::config::Config;
use strata::memory::{EpisodeKind, EpisodicNode};
use strata::testing::FlakyStore;
use strata::{MaintenanceHandle, MemorySystem};

#[tokio::test(start_paused = true)]
async fn test_loop_survives_failed_pass() {
    let store = Arc::new(FlakyStore::new());
    let system = Arc::new(MemorySystem::new(&Config::default(), store.clone()));
    system
        .add_episodic(EpisodicNode::new("evening run", EpisodeKind::Experience))
        .await
        .unwrap();
    store.fail_saves(true);

    let handle = MaintenanceHandle::spawn(system.clone(), Duration::from_secs(60));

    tokio::time::sleep(Duration::from_secs(61)).await;
    let status = system.get_system_status().await;
    assert_eq!(status.consolidation_count, 0);
    assert!(status.last_error.is_some());
    assert!(handle.is_running());

    store.fail_saves(false);
    tokio::time::sleep(Duration::from_secs(60)).await;
    let status = system.get_system_status().await;
    assert_eq!(status.consolidation_count, 1);
    assert!(status.last_error.is_none());

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_ticks_skip_when_not_due() {
    let system = Arc::new(MemorySystem::new(
        &Config::default(),
        Arc::new(FlakyStore::new()),
    ));
    let handle = MaintenanceHandle::spawn(system.clone(), Duration::from_secs(10));

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(system.get_system_status().await.consolidation_count, 1);

    // Later ticks find the last pass recent and the load low
    tokio::time::sleep(Duration::from_secs(50)).await;
    assert_eq!(system.get_system_status().await.consolidation_count, 1);

    // The default 300 s interval is due again at the tick 300 s after the first pass
    tokio::time::sleep(Duration::from_secs(248)).await;
    assert_eq!(system.get_system_status().await.consolidation_count, 1);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(system.get_system_status().await.consolidation_count, 2);

    handle.stop().await;
    assert!(!system.is_consolidating());
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_running_pass() {
    let store = Arc::new(FlakyStore::new());
    let system = Arc::new(MemorySystem::new(&Config::default(), store.clone()));
    system
        .add_episodic(EpisodicNode::new("slow save", EpisodeKind::Event))
        .await
        .unwrap();
    store.set_save_delay(Duration::from_secs(5));

    let handle = MaintenanceHandle::spawn(system.clone(), Duration::from_secs(10));
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(system.is_consolidating());

    handle.stop().await;
    assert!(!system.is_consolidating());
    assert_eq!(system.get_system_status().await.consolidation_count, 1);
}
