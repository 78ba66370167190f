//! Integration tests for the pairing and dispatch engine

mod common;

use std::sync::atomic::Ordering;

use booth_print::dispatch::{ReconcilePolicy, TickOutcome};
use booth_print::job::{CustomerStatus, JobStatus, Orientation, PageSize};
use booth_print::settings;
use booth_print::store::JobStore;
use chrono::Duration;
use common::{Harness, PRINTER};

#[tokio::test]
async fn test_empty_queue_is_idle() {
    let h = Harness::new();
    assert_eq!(h.dispatcher.tick().await, TickOutcome::Idle);
    assert_eq!(h.dispatcher.ticks(), 1);
}

#[tokio::test]
async fn test_full_page_job_is_printed_directly() {
    let h = Harness::new();
    let job = h.job(7, "session1/a.jpg", PageSize::Full, 0).await;

    let outcome = h.dispatcher.tick().await;

    assert!(matches!(outcome, TickOutcome::Printed { ref job_ids, .. } if job_ids == &vec![job.id]));
    assert_eq!(h.status_of(&job).await, JobStatus::Done);
    assert_eq!(h.store.customer_status(7).await, Some(CustomerStatus::Printed));
    let submissions = h.printer.submissions.lock().unwrap().clone();
    assert_eq!(submissions, vec![(h.projects().join("session1/a.jpg"), PRINTER.to_string())]);
    assert!(h.compositor.merged().is_empty());
}

#[tokio::test]
async fn test_full_page_wins_over_complete_pair() {
    let h = Harness::new();
    let a = h.job(1, "a.jpg", PageSize::HalfVertical, 30).await;
    let b = h.job(2, "b.jpg", PageSize::HalfVertical, 30).await;
    let full = h.job(3, "full.jpg", PageSize::Full, 0).await;

    h.dispatcher.tick().await;
    assert_eq!(h.status_of(&full).await, JobStatus::Done);
    assert_eq!(h.status_of(&a).await, JobStatus::Pending);
    assert_eq!(h.status_of(&b).await, JobStatus::Pending);

    h.dispatcher.tick().await;
    assert_eq!(h.status_of(&a).await, JobStatus::Done);
    assert_eq!(h.status_of(&b).await, JobStatus::Done);
}

#[tokio::test]
async fn test_oldest_halves_are_paired_first() {
    let h = Harness::new();
    let young = h.job(1, "young.jpg", PageSize::HalfVertical, 5).await;
    let oldest = h.job(2, "oldest.jpg", PageSize::HalfVertical, 20).await;
    let middle = h.job(3, "middle.jpg", PageSize::HalfVertical, 10).await;

    let outcome = h.dispatcher.tick().await;

    assert!(
        matches!(outcome, TickOutcome::Printed { ref job_ids, .. } if job_ids == &vec![oldest.id, middle.id])
    );
    assert_eq!(h.status_of(&young).await, JobStatus::Pending);
    let merges = h.compositor.merged();
    assert_eq!(
        merges,
        vec![(
            h.projects().join("oldest.jpg"),
            h.projects().join("middle.jpg"),
            Orientation::Vertical
        )]
    );
    assert_eq!(h.printer.submitted(), vec![std::path::PathBuf::from("/merged/merged_print_0.jpg")]);
}

#[tokio::test]
async fn test_equal_timestamps_pair_in_insertion_order() {
    let h = Harness::new();
    let a = h.job(1, "a.jpg", PageSize::HalfHorizontal, 0).await;
    let b = h.job(2, "b.jpg", PageSize::HalfHorizontal, 0).await;
    let c = h.job(3, "c.jpg", PageSize::HalfHorizontal, 0).await;

    let outcome = h.dispatcher.tick().await;

    assert!(matches!(outcome, TickOutcome::Printed { ref job_ids, .. } if job_ids == &vec![a.id, b.id]));
    assert_eq!(h.status_of(&c).await, JobStatus::Pending);
}

#[tokio::test]
async fn test_vertical_pair_before_horizontal_pair() {
    let h = Harness::new();
    let h1 = h.job(1, "h1.jpg", PageSize::HalfHorizontal, 60).await;
    let h2 = h.job(2, "h2.jpg", PageSize::HalfHorizontal, 60).await;
    h.job(3, "v1.jpg", PageSize::HalfVertical, 1).await;
    h.job(4, "v2.jpg", PageSize::HalfVertical, 1).await;

    h.dispatcher.tick().await;
    assert_eq!(h.compositor.merged()[0].2, Orientation::Vertical);
    assert_eq!(h.status_of(&h1).await, JobStatus::Pending);

    h.dispatcher.tick().await;
    assert_eq!(h.compositor.merged()[1].2, Orientation::Horizontal);
    assert_eq!(h.status_of(&h2).await, JobStatus::Done);
}

#[tokio::test]
async fn test_composite_failure_fails_both_halves() {
    let h = Harness::new();
    let a = h.job(1, "a.jpg", PageSize::HalfVertical, 0).await;
    let b = h.job(2, "b.jpg", PageSize::HalfVertical, 0).await;
    h.compositor.fail.store(true, Ordering::SeqCst);

    let outcome = h.dispatcher.tick().await;

    assert!(matches!(outcome, TickOutcome::Failed { ref job_ids, .. } if job_ids.len() == 2));
    assert_eq!(h.status_of(&a).await, JobStatus::Failed);
    assert_eq!(h.status_of(&b).await, JobStatus::Failed);
    assert_eq!(h.store.customer_status(1).await, Some(CustomerStatus::Failed));
    assert_eq!(h.store.customer_status(2).await, Some(CustomerStatus::Failed));
    assert!(h.printer.submitted().is_empty());
}

#[tokio::test]
async fn test_printer_rejecting_a_pair_fails_both_halves() {
    let h = Harness::new();
    let a = h.job(1, "a.jpg", PageSize::HalfHorizontal, 0).await;
    let b = h.job(2, "b.jpg", PageSize::HalfHorizontal, 0).await;
    h.printer.reject.store(true, Ordering::SeqCst);

    h.dispatcher.tick().await;

    assert_eq!(h.status_of(&a).await, JobStatus::Failed);
    assert_eq!(h.status_of(&b).await, JobStatus::Failed);
    // Nothing left pending, so nothing is retried.
    assert_eq!(h.dispatcher.tick().await, TickOutcome::Idle);
}

#[tokio::test]
async fn test_missing_partner_file_fails_pair_without_merging() {
    let h = Harness::new();
    let a = h.job(1, "a.jpg", PageSize::HalfVertical, 0).await;
    let b = h.job_without_file(2, "gone.jpg", PageSize::HalfVertical, 0).await;

    let outcome = h.dispatcher.tick().await;

    match outcome {
        TickOutcome::Failed { job_ids, reason } => {
            assert_eq!(job_ids, vec![a.id, b.id]);
            assert!(reason.contains("gone.jpg"), "{reason}");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(h.status_of(&a).await, JobStatus::Failed);
    assert_eq!(h.status_of(&b).await, JobStatus::Failed);
    assert!(h.compositor.merged().is_empty());
}

#[tokio::test]
async fn test_missing_full_page_file_fails_job() {
    let h = Harness::new();
    let job = h.job_without_file(5, "nowhere.jpg", PageSize::Full, 0).await;

    let outcome = h.dispatcher.tick().await;

    assert!(matches!(outcome, TickOutcome::Failed { .. }));
    assert_eq!(h.status_of(&job).await, JobStatus::Failed);
    assert_eq!(h.store.customer_status(5).await, Some(CustomerStatus::Failed));
    assert!(h.printer.submitted().is_empty());
}

#[tokio::test]
async fn test_printer_rejection_fails_full_page_job() {
    let h = Harness::new();
    let job = h.job(9, "a.jpg", PageSize::Full, 0).await;
    h.printer.reject.store(true, Ordering::SeqCst);

    let outcome = h.dispatcher.tick().await;

    match outcome {
        TickOutcome::Failed { job_ids, reason } => {
            assert_eq!(job_ids, vec![job.id]);
            assert!(reason.contains("out of paper"), "{reason}");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(h.status_of(&job).await, JobStatus::Failed);
    assert_eq!(h.store.customer_status(9).await, Some(CustomerStatus::Failed));
}

#[tokio::test]
async fn test_no_printer_selected_fails_without_merging() {
    let h = Harness::new();
    h.settings.remove(settings::SELECTED_PRINTER_NAME);
    let full = h.job(1, "full.jpg", PageSize::Full, 0).await;
    let a = h.job(2, "a.jpg", PageSize::HalfVertical, 0).await;
    let b = h.job(3, "b.jpg", PageSize::HalfVertical, 0).await;

    h.dispatcher.tick().await;
    h.dispatcher.tick().await;

    assert_eq!(h.status_of(&full).await, JobStatus::Failed);
    assert_eq!(h.status_of(&a).await, JobStatus::Failed);
    assert_eq!(h.status_of(&b).await, JobStatus::Failed);
    assert!(h.compositor.merged().is_empty());
    assert!(h.printer.submitted().is_empty());
}

#[tokio::test]
async fn test_young_orphan_waits_for_a_partner() {
    let h = Harness::new();
    h.with_stock_photo();
    let orphan = h.job(1, "lonely.jpg", PageSize::HalfVertical, 9).await;

    assert_eq!(h.dispatcher.tick().await, TickOutcome::OrphanDeferred { job_id: orphan.id });
    // Exactly at the threshold is still too young.
    h.clock.advance(Duration::minutes(1));
    assert_eq!(h.dispatcher.tick().await, TickOutcome::OrphanDeferred { job_id: orphan.id });
    assert_eq!(h.status_of(&orphan).await, JobStatus::Pending);

    h.clock.advance(Duration::minutes(1));
    let outcome = h.dispatcher.tick().await;
    assert!(matches!(outcome, TickOutcome::Printed { ref job_ids, .. } if job_ids == &vec![orphan.id]));
    assert_eq!(h.status_of(&orphan).await, JobStatus::Done);
}

#[tokio::test]
async fn test_orphan_is_merged_with_stock_photo() {
    let h = Harness::new();
    let stock = h.with_stock_photo();
    h.job(1, "lonely.jpg", PageSize::HalfHorizontal, 11).await;

    h.dispatcher.tick().await;

    assert_eq!(
        h.compositor.merged(),
        vec![(h.projects().join("lonely.jpg"), stock, Orientation::Horizontal)]
    );
    assert_eq!(h.store.customer_status(1).await, Some(CustomerStatus::Printed));
}

#[tokio::test]
async fn test_orphan_threshold_follows_settings() {
    let h = Harness::new();
    h.with_stock_photo();
    h.settings.set(settings::ORPHAN_WAIT_TIME, 2.5);
    let orphan = h.job(1, "lonely.jpg", PageSize::HalfVertical, 3).await;

    assert!(matches!(h.dispatcher.tick().await, TickOutcome::Printed { .. }));
    assert_eq!(h.status_of(&orphan).await, JobStatus::Done);
}

#[tokio::test]
async fn test_orphan_without_stock_photo_waits_forever() {
    let h = Harness::new();
    let orphan = h.job(1, "lonely.jpg", PageSize::HalfVertical, 600).await;

    assert_eq!(h.dispatcher.tick().await, TickOutcome::OrphanDeferred { job_id: orphan.id });
    assert_eq!(h.status_of(&orphan).await, JobStatus::Pending);
}

#[tokio::test]
async fn test_orphan_with_missing_stock_file_waits() {
    let h = Harness::new();
    h.settings
        .set(settings::STOCK_PHOTO_PATH, h.dir.path().join("deleted.jpg").to_string_lossy().to_string());
    let orphan = h.job(1, "lonely.jpg", PageSize::HalfVertical, 60).await;

    assert_eq!(h.dispatcher.tick().await, TickOutcome::OrphanDeferred { job_id: orphan.id });
    assert!(h.compositor.merged().is_empty());
}

#[tokio::test]
async fn test_orphan_with_missing_source_fails() {
    let h = Harness::new();
    h.with_stock_photo();
    let orphan = h.job_without_file(4, "vanished.jpg", PageSize::HalfVertical, 60).await;

    assert!(matches!(h.dispatcher.tick().await, TickOutcome::Failed { .. }));
    assert_eq!(h.status_of(&orphan).await, JobStatus::Failed);
    assert_eq!(h.store.customer_status(4).await, Some(CustomerStatus::Failed));
}

#[tokio::test]
async fn test_orphan_printer_rejection_fails_job() {
    let h = Harness::new();
    h.with_stock_photo();
    h.settings.set(settings::REST_AFTER_PRINTS, 1);
    h.printer.reject.store(true, Ordering::SeqCst);
    let orphan = h.job(5, "lonely.jpg", PageSize::HalfVertical, 11).await;

    let outcome = h.dispatcher.tick().await;
    assert!(matches!(outcome, TickOutcome::Failed { ref job_ids, .. } if job_ids == &vec![orphan.id]));
    assert_eq!(h.status_of(&orphan).await, JobStatus::Failed);
    assert_eq!(h.store.customer_status(5).await, Some(CustomerStatus::Failed));

    h.printer.reject.store(false, Ordering::SeqCst);
    h.job(6, "next.jpg", PageSize::Full, 0).await;
    assert!(matches!(h.dispatcher.tick().await, TickOutcome::Printed { .. }));
    assert_eq!(h.dispatcher.tick().await, TickOutcome::Resting);
}

#[tokio::test]
async fn test_orphan_composite_failure_fails_job() {
    let h = Harness::new();
    h.with_stock_photo();
    h.settings.set(settings::REST_AFTER_PRINTS, 1);
    h.compositor.fail.store(true, Ordering::SeqCst);
    let orphan = h.job(5, "lonely.jpg", PageSize::HalfHorizontal, 11).await;

    let outcome = h.dispatcher.tick().await;
    assert!(matches!(outcome, TickOutcome::Failed { ref job_ids, .. } if job_ids == &vec![orphan.id]));
    assert_eq!(h.status_of(&orphan).await, JobStatus::Failed);
    assert_eq!(h.store.customer_status(5).await, Some(CustomerStatus::Failed));
    assert!(h.printer.submitted().is_empty());

    h.job(6, "next.jpg", PageSize::Full, 0).await;
    assert!(matches!(h.dispatcher.tick().await, TickOutcome::Printed { .. }));
    assert_eq!(h.dispatcher.tick().await, TickOutcome::Resting);
}

#[tokio::test]
async fn test_pair_then_orphan_with_filler() {
    let h = Harness::new();
    h.with_stock_photo();
    let first = h.job(1, "first.jpg", PageSize::HalfVertical, 30).await;
    let second = h.job(2, "second.jpg", PageSize::HalfVertical, 20).await;
    let third = h.job(3, "third.jpg", PageSize::HalfVertical, 15).await;

    let outcome = h.dispatcher.tick().await;
    assert!(
        matches!(outcome, TickOutcome::Printed { ref job_ids, .. } if job_ids == &vec![first.id, second.id])
    );
    assert_eq!(h.status_of(&third).await, JobStatus::Pending);

    let outcome = h.dispatcher.tick().await;
    assert!(matches!(outcome, TickOutcome::Printed { ref job_ids, .. } if job_ids == &vec![third.id]));
    for job in [&first, &second, &third] {
        assert_eq!(h.status_of(job).await, JobStatus::Done);
    }
    assert_eq!(h.printer.submitted().len(), 2);
}

#[tokio::test]
async fn test_fresh_leftover_after_pairing_is_deferred() {
    let h = Harness::new();
    h.with_stock_photo();
    let old = h.job(1, "old.jpg", PageSize::HalfVertical, 15).await;
    let a = h.job(2, "a.jpg", PageSize::HalfVertical, 0).await;
    let b = h.job(3, "b.jpg", PageSize::HalfVertical, 0).await;

    let outcome = h.dispatcher.tick().await;
    assert!(matches!(outcome, TickOutcome::Printed { ref job_ids, .. } if job_ids == &vec![old.id, a.id]));
    assert_eq!(h.dispatcher.tick().await, TickOutcome::OrphanDeferred { job_id: b.id });
}

#[tokio::test]
async fn test_rest_after_configured_completions() {
    let h = Harness::new();
    h.settings.set(settings::REST_AFTER_PRINTS, 2);
    h.settings.set(settings::REST_DURATION, 5);
    for (customer, name) in [(1, "a.jpg"), (2, "b.jpg"), (3, "c.jpg")] {
        h.job(customer, name, PageSize::Full, 0).await;
    }

    assert!(matches!(h.dispatcher.tick().await, TickOutcome::Printed { .. }));
    assert!(matches!(h.dispatcher.tick().await, TickOutcome::Printed { .. }));
    assert_eq!(h.dispatcher.tick().await, TickOutcome::Resting);
    assert!(h.dispatcher.rest_snapshot().await.resting);

    h.clock.advance(Duration::minutes(4));
    assert_eq!(h.dispatcher.tick().await, TickOutcome::Resting);
    assert_eq!(h.store.list(Some(JobStatus::Pending)).await.unwrap().len(), 1);

    h.clock.advance(Duration::minutes(1));
    assert!(matches!(h.dispatcher.tick().await, TickOutcome::Printed { .. }));
    let snapshot = h.dispatcher.rest_snapshot().await;
    assert!(!snapshot.resting);
    assert_eq!(snapshot.completed_since_rest, 1);
}

#[tokio::test]
async fn test_zero_rest_threshold_never_rests() {
    let h = Harness::new();
    h.settings.set(settings::REST_AFTER_PRINTS, 0);
    for customer in 1..=4 {
        h.job(customer, &format!("{customer}.jpg"), PageSize::Full, 0).await;
    }
    for _ in 0..4 {
        assert!(matches!(h.dispatcher.tick().await, TickOutcome::Printed { .. }));
    }
}

#[tokio::test]
async fn test_failures_do_not_count_toward_rest() {
    let h = Harness::new();
    h.settings.set(settings::REST_AFTER_PRINTS, 1);
    h.job_without_file(1, "gone.jpg", PageSize::Full, 0).await;
    let ok = h.job(2, "ok.jpg", PageSize::Full, 0).await;

    assert!(matches!(h.dispatcher.tick().await, TickOutcome::Failed { .. }));
    assert!(matches!(h.dispatcher.tick().await, TickOutcome::Printed { .. }));
    assert_eq!(h.status_of(&ok).await, JobStatus::Done);
    assert_eq!(h.dispatcher.tick().await, TickOutcome::Resting);
}

#[tokio::test]
async fn test_reconcile_requeues_interrupted_jobs() {
    let h = Harness::new();
    let full = h.job(1, "a.jpg", PageSize::Full, 0).await;
    let half = h.job(2, "b.jpg", PageSize::HalfVertical, 0).await;
    h.store.set_status(&[full.id], JobStatus::Printing).await.unwrap();
    h.store.set_status(&[half.id], JobStatus::Paired).await.unwrap();

    assert_eq!(h.dispatcher.reconcile_interrupted(ReconcilePolicy::Requeue).await.unwrap(), 2);
    assert_eq!(h.status_of(&full).await, JobStatus::Pending);
    assert_eq!(h.status_of(&half).await, JobStatus::Pending);
    assert!(h.store.customer_updates().await.is_empty());
}

#[tokio::test]
async fn test_reconcile_fail_notifies_customers() {
    let h = Harness::new();
    let full = h.job(1, "a.jpg", PageSize::Full, 0).await;
    h.store.set_status(&[full.id], JobStatus::Printing).await.unwrap();

    assert_eq!(h.dispatcher.reconcile_interrupted(ReconcilePolicy::Fail).await.unwrap(), 1);
    assert_eq!(h.status_of(&full).await, JobStatus::Failed);
    assert_eq!(h.store.customer_status(1).await, Some(CustomerStatus::Failed));
}

#[tokio::test]
async fn test_reconcile_leave_touches_nothing() {
    let h = Harness::new();
    let full = h.job(1, "a.jpg", PageSize::Full, 0).await;
    h.store.set_status(&[full.id], JobStatus::Printing).await.unwrap();

    assert_eq!(h.dispatcher.reconcile_interrupted(ReconcilePolicy::Leave).await.unwrap(), 1);
    assert_eq!(h.status_of(&full).await, JobStatus::Printing);
    // In-flight rows are invisible to dispatch.
    assert_eq!(h.dispatcher.tick().await, TickOutcome::Idle);
}
