use super::*;

#[tokio::test]
async fn test_stop_waiting_task_marks_cancelled() {
    let (downloader, _transfers, _temp_dir) = create_test_downloader().await;
    let id = downloader.add_task("https://a/x.m3u8", None).await.unwrap();

    downloader.stop(id).await.unwrap();

    let task = downloader.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status(), TaskStatus::Cancelled);

    // The queue processor drops the entry instead of starting it
    assert_eq!(downloader.admit_ready_tasks().await.unwrap(), 0);
    assert!(downloader.queue_state.registry.lock().await.waiting.is_empty());
    assert_eq!(
        downloader.db.get_task(id).await.unwrap().unwrap().status(),
        TaskStatus::Cancelled
    );
}

#[tokio::test]
async fn test_stop_pending_task_without_token_creates_one() {
    let (downloader, _transfers, _temp_dir) = create_test_downloader().await;
    let id = downloader.db.create_task("https://a/x.m3u8", None).await.unwrap();

    downloader.stop(id).await.unwrap();

    let registry = downloader.queue_state.registry.lock().await;
    assert!(registry.tokens.get(&id).unwrap().is_cancelled());
}

#[tokio::test]
async fn test_stop_unknown_or_finished_task_fails() {
    let (downloader, _transfers, _temp_dir) = create_test_downloader().await;

    let err = downloader.stop(TaskId(999)).await.unwrap_err();
    assert!(matches!(err, Error::Task(TaskError::NotActive { id: 999 })));
    assert_eq!(err.to_string(), "task error: task 999 is not running or waiting");

    let id = downloader.db.create_task("https://a/x.m3u8", None).await.unwrap();
    downloader
        .db
        .update_task(id, &crate::db::TaskUpdate::status(TaskStatus::Completed))
        .await
        .unwrap();
    let err = downloader.stop(id).await.unwrap_err();
    assert_eq!(err.error_code(), "not_active");
    assert!(!downloader.queue_state.registry.lock().await.tokens.contains_key(&id));
}

#[tokio::test]
async fn test_stop_reserved_slot_moves_to_stopping() {
    let (downloader, _transfers, _temp_dir) = create_test_downloader().await;
    let id = downloader.db.create_task("https://a/x.m3u8", None).await.unwrap();
    let token = downloader.queue_state.shutdown.child_token();
    {
        let mut registry = downloader.queue_state.registry.lock().await;
        registry.active.insert(id, ActiveSlot::Reserved);
        registry.tokens.insert(id, token.clone());
    }

    downloader.stop(id).await.unwrap();

    assert!(token.is_cancelled());
    let registry = downloader.queue_state.registry.lock().await;
    assert!(!registry.active.contains_key(&id));
    assert!(registry.stopping.contains(&id));
    drop(registry);
    assert_eq!(
        downloader.db.get_task(id).await.unwrap().unwrap().status(),
        TaskStatus::Cancelled
    );
}

#[tokio::test]
async fn test_retry_rejects_pending_task() {
    let (downloader, _transfers, _temp_dir) = create_test_downloader().await;
    let id = downloader.add_task("https://a/x.m3u8", None).await.unwrap();

    let err = downloader.retry(id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Task(TaskError::InvalidState { ref operation, .. }) if operation == "retry"
    ));
}

#[tokio::test]
async fn test_retry_missing_task_is_not_found() {
    let (downloader, _transfers, _temp_dir) = create_test_downloader().await;
    let err = downloader.retry(TaskId(404)).await.unwrap_err();
    assert_eq!(err.error_code(), "task_not_found");
}

#[tokio::test]
async fn test_retry_failed_task_resubmits_with_stored_name() {
    let (downloader, _transfers, _temp_dir) = create_test_downloader().await;
    let id = downloader
        .db
        .create_task("https://a/x.m3u8", Some("episode"))
        .await
        .unwrap();
    downloader
        .db
        .update_task(
            id,
            &crate::db::TaskUpdate {
                progress: Some(12.0),
                ..crate::db::TaskUpdate::failed("downloader exited with code 1")
            },
        )
        .await
        .unwrap();

    downloader.retry(id).await.unwrap();

    let task = downloader.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status(), TaskStatus::Pending);
    assert_eq!(task.progress, 0.0);
    assert_eq!(task.error_message, "");

    let registry = downloader.queue_state.registry.lock().await;
    assert_eq!(registry.waiting.len(), 1);
    assert_eq!(registry.waiting[0].name.as_deref(), Some("episode"));
}

#[tokio::test]
async fn test_remove_deletes_record_file_and_temp_entries() {
    let (downloader, _transfers, temp_dir) = create_test_downloader().await;
    let id = downloader
        .db
        .create_task("https://a/x.m3u8", Some("show"))
        .await
        .unwrap();

    let output = temp_dir.path().join("downloads").join("show.mp4");
    std::fs::write(&output, b"data").unwrap();
    downloader
        .db
        .update_task(
            id,
            &crate::db::TaskUpdate {
                file_path: Some(output.to_string_lossy().into_owned()),
                ..crate::db::TaskUpdate::status(TaskStatus::Completed)
            },
        )
        .await
        .unwrap();

    let temp = temp_dir.path().join("temp");
    std::fs::create_dir_all(temp.join("show_segments")).unwrap();
    std::fs::write(temp.join("show_segments").join("0001.ts"), b"x").unwrap();
    std::fs::write(temp.join("unrelated.ts"), b"x").unwrap();

    downloader.remove(id, true).await.unwrap();

    assert!(downloader.db.get_task(id).await.unwrap().is_none());
    assert!(!output.exists());
    assert!(!temp.join("show_segments").exists());
    assert!(temp.join("unrelated.ts").exists());
}

#[tokio::test]
async fn test_remove_batch_reports_each_id() {
    let (downloader, _transfers, _temp_dir) = create_test_downloader().await;
    let waiting = downloader.add_task("https://a/1.m3u8", None).await.unwrap();
    let finished = downloader.db.create_task("https://a/2.m3u8", None).await.unwrap();
    downloader
        .db
        .update_task(finished, &crate::db::TaskUpdate::status(TaskStatus::Completed))
        .await
        .unwrap();
    let mut events = downloader.subscribe();

    let results = downloader
        .remove_batch(&[waiting, TaskId(404), finished], false)
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].0, waiting);
    assert!(results[0].1.is_ok());
    assert_eq!(results[1].0, TaskId(404));
    assert_eq!(
        results[1].1.as_ref().unwrap_err().error_code(),
        "task_not_found"
    );
    assert!(results[2].1.is_ok());

    assert!(downloader.db.get_task(waiting).await.unwrap().is_none());
    assert!(downloader.db.get_task(finished).await.unwrap().is_none());
    assert!(downloader.queue_state.registry.lock().await.waiting.is_empty());
    assert!(matches!(events.try_recv(), Ok(Event::Removed { id }) if id == waiting));
    assert!(matches!(events.try_recv(), Ok(Event::Removed { id }) if id == finished));
}

#[tokio::test]
async fn test_remove_waiting_task_leaves_queue() {
    let (downloader, _transfers, _temp_dir) = create_test_downloader().await;
    let id = downloader.add_task("https://a/x.m3u8", None).await.unwrap();

    downloader.remove(id, false).await.unwrap();

    let registry = downloader.queue_state.registry.lock().await;
    assert!(registry.waiting.is_empty());
    assert!(!registry.tokens.contains_key(&id));
}

#[tokio::test]
async fn test_clean_temp_files_matches_name_or_id() {
    let (downloader, _transfers, temp_dir) = create_test_downloader().await;
    let temp = temp_dir.path().join("temp");
    std::fs::write(temp.join("news_part1.ts"), b"x").unwrap();
    std::fs::write(temp.join("video_77_20260101_101010.ts"), b"x").unwrap();
    std::fs::write(temp.join("other.ts"), b"x").unwrap();
    std::fs::create_dir(temp.join("video_770_20260101_101010")).unwrap();

    let removed = downloader
        .clean_temp_files(TaskId(77), Some("news"))
        .await
        .unwrap();

    assert_eq!(removed, 2);
    assert!(temp.join("other.ts").exists());
    assert!(temp.join("video_770_20260101_101010").exists());
}

#[tokio::test]
async fn test_remove_keeps_temp_entries_of_other_tasks() {
    let (downloader, _transfers, temp_dir) = create_test_downloader().await;
    let id = downloader.db.create_task("https://a/x.m3u8", None).await.unwrap();
    assert_eq!(id, TaskId(1));

    let temp = temp_dir.path().join("temp");
    std::fs::create_dir(temp.join("video_1_20260101_101010")).unwrap();
    std::fs::create_dir(temp.join("video_12_20260101_101010")).unwrap();
    std::fs::create_dir(temp.join("video_21_20260101_101010")).unwrap();

    downloader.remove(id, true).await.unwrap();

    assert!(!temp.join("video_1_20260101_101010").exists());
    assert!(temp.join("video_12_20260101_101010").exists());
    assert!(temp.join("video_21_20260101_101010").exists());
}

#[tokio::test]
async fn test_clean_temp_files_missing_dir_is_noop() {
    let (downloader, _transfers, temp_dir) = create_test_downloader().await;
    std::fs::remove_dir_all(temp_dir.path().join("temp")).unwrap();

    assert_eq!(downloader.clean_temp_files(TaskId(1), None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_upload_connection_requires_host_and_user() {
    let (downloader, transfers, _temp_dir) = create_test_downloader().await;

    let err = downloader.test_upload_connection().await.unwrap_err();
    assert_eq!(err.error_code(), "incomplete_config");

    set(&downloader, keys::FTP_HOST, "ftp.example.com").await;
    set(&downloader, keys::FTP_USERNAME, "uploader").await;
    downloader.test_upload_connection().await.unwrap();

    *transfers.uploader.fail.lock().unwrap() = true;
    let err = downloader.test_upload_connection().await.unwrap_err();
    assert_eq!(err.error_code(), "upload_failed");
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_running_task_terminates_process_group() {
    let (downloader, _transfers, temp_dir) = create_test_downloader().await;
    install_fake_downloader(&downloader, temp_dir.path(), LONG_RUNNING_SCRIPT).await;
    let processor = downloader.start_queue_processor();

    let id = downloader.add_task("https://cdn/x.m3u8", None).await.unwrap();
    wait_until(Duration::from_secs(10), || {
        let downloader = downloader.clone();
        async move {
            let registry = downloader.queue_state.registry.lock().await;
            registry.active.get(&id).and_then(ActiveSlot::pid).is_some()
        }
    })
    .await;

    downloader.stop(id).await.unwrap();
    assert!(!downloader.active_tasks().await.contains(&id));

    wait_until(Duration::from_secs(10), || {
        let downloader = downloader.clone();
        async move { !downloader.queue_state.registry.lock().await.stopping.contains(&id) }
    })
    .await;

    let task = downloader.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status(), TaskStatus::Cancelled);
    assert!(task.error_message.is_empty());

    processor.abort();
}
