//! Playback-triggered resolution: album expansion, downloads, streaming, links

mod helpers;

use helpers::{
    add_library_file, fixture, lf_track, main_master, release_detail, search_result,
    FakeDiscogs, FakeFetcher, FakeLastfm, FetchBehavior, Fixture, RecordingProgress,
};
use mbx_explore::error::ExploreError;
use mbx_explore::library::{HostLibrary, PlayState, Tag};
use mbx_explore::models::{CommentData, Source, State};
use mbx_explore::processor::{ProcessOutcome, BACKUP_SUFFIX};
use mbx_explore::Settings;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn discogs_with_album(tracks: &[&str]) -> Arc<FakeDiscogs> {
    let mut releases = HashMap::new();
    releases.insert(10_001, release_detail(10_001, "ArtistX", tracks));
    Arc::new(FakeDiscogs {
        search_results: vec![search_result(1, "ArtistX")],
        release_pages: vec![vec![main_master(1, "First Album", "ArtistX", 2001)]],
        releases,
        ..FakeDiscogs::default()
    })
}

fn album_folder(fx: &Fixture) -> PathBuf {
    fx.explorer.paths().cache_dir.join("ArtistX").join("First Album")
}

/// Run a discography lookup and return the album placeholder
async fn load_discography(fx: &Fixture) -> PathBuf {
    fx.explorer
        .discography(
            "ArtistX",
            Source::Discogs,
            &RecordingProgress::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let album = album_folder(fx).join("__Load Album__.opus");
    assert!(fx.library.contains(&album));
    album
}

async fn play(fx: &Fixture, path: &Path) -> Result<ProcessOutcome, ExploreError> {
    fx.library.set_now_playing(vec![path.to_path_buf()], Some(0));
    fx.explorer
        .on_now_playing_changed(&RecordingProgress::default(), &CancellationToken::new())
        .await
}

fn state_of(fx: &Fixture, path: &Path) -> State {
    let comment = fx.library.get_tag(path, Tag::Comment).unwrap();
    CommentData::decode(&comment).unwrap().unwrap().state
}

/// Album placeholder expanded into track placeholders
async fn expanded_track(fx: &Fixture) -> PathBuf {
    let album = load_discography(fx).await;
    let outcome = play(fx, &album).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::AlbumExpanded { tracks: 2, .. }));
    album_folder(fx).join("01 - ArtistX - Intro.opus")
}

#[tokio::test]
async fn test_album_expands_into_track_placeholders() {
    let fx = fixture(
        discogs_with_album(&["Intro", "Song"]),
        Arc::new(FakeLastfm::default()),
        FakeFetcher::new(FetchBehavior::Fail),
        Settings::default(),
    );
    let album = load_discography(&fx).await;

    let outcome = play(&fx, &album).await.unwrap();
    match outcome {
        ProcessOutcome::AlbumExpanded {
            tracks,
            summary,
            advanced,
        } => {
            assert_eq!(tracks, 2);
            assert_eq!(summary.written, 2);
            assert!(!advanced);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(fx.library.play_state(), PlayState::Paused);

    let first = album_folder(&fx).join("01 - ArtistX - Intro.opus");
    let second = album_folder(&fx).join("02 - ArtistX - Song.opus");
    for path in [&first, &second] {
        assert!(fx.library.contains(path));
        assert_eq!(state_of(&fx, path), State::UnloadedTrack);
        assert_eq!(fx.library.get_tag(path, Tag::Album).as_deref(), Some("First Album"));
        assert_eq!(fx.library.get_tag(path, Tag::TrackCount).as_deref(), Some("2"));
    }
    assert_eq!(fx.library.get_tag(&second, Tag::TrackNo).as_deref(), Some("2"));
    assert_eq!(
        fx.library.get_tag(&first, Tag::Artist).as_deref(),
        Some("ArtistX")
    );
}

#[tokio::test]
async fn test_album_load_queues_tracks_when_enabled() {
    let settings = Settings {
        queue_tracks_after_album_load: true,
        ..Settings::default()
    };
    let fx = fixture(
        discogs_with_album(&["Intro", "Song"]),
        Arc::new(FakeLastfm::default()),
        FakeFetcher::new(FetchBehavior::Fail),
        settings,
    );
    let album = load_discography(&fx).await;

    let outcome = play(&fx, &album).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::AlbumExpanded { advanced: true, .. }));

    let first = album_folder(&fx).join("01 - ArtistX - Intro.opus");
    let second = album_folder(&fx).join("02 - ArtistX - Song.opus");
    assert_eq!(fx.library.now_playing_list(), vec![first.clone(), second]);
    assert_eq!(fx.library.now_playing(), Some(first));
}

#[tokio::test]
async fn test_zero_track_album_writes_nothing() {
    let fx = fixture(
        discogs_with_album(&[]),
        Arc::new(FakeLastfm::default()),
        FakeFetcher::new(FetchBehavior::Fail),
        Settings::default(),
    );
    let album = load_discography(&fx).await;
    let files_before = fx.library.files();
    let refreshes_before = fx.library.refresh_count();

    let outcome = play(&fx, &album).await.unwrap();

    assert!(matches!(outcome, ProcessOutcome::AlbumExpanded { tracks: 0, .. }));
    assert_eq!(fx.library.files(), files_before);
    assert_eq!(fx.library.refresh_count(), refreshes_before + 1);
    let on_disk: Vec<_> = std::fs::read_dir(album_folder(&fx))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".opus"))
        .collect();
    assert_eq!(on_disk, vec!["__Load Album__.opus".to_string()]);
}

#[tokio::test]
async fn test_failed_download_restores_placeholder() {
    let fx = fixture(
        discogs_with_album(&["Intro", "Song"]),
        Arc::new(FakeLastfm::default()),
        FakeFetcher::new(FetchBehavior::Fail),
        Settings::default(),
    );
    let track = expanded_track(&fx).await;
    let before = std::fs::read(&track).unwrap();

    let err = play(&fx, &track).await.unwrap_err();

    assert!(matches!(err, ExploreError::DownloadFailed(_)), "got {:?}", err);
    assert_eq!(std::fs::read(&track).unwrap(), before);
    assert_eq!(state_of(&fx, &track), State::UnloadedTrack);
    let mut backup = track.as_os_str().to_os_string();
    backup.push(BACKUP_SUFFIX);
    assert!(!PathBuf::from(backup).exists());
    assert_eq!(
        *fx.fetcher.queries.lock().unwrap(),
        vec!["ArtistX - Intro".to_string()]
    );
}

#[tokio::test]
async fn test_empty_search_restores_placeholder() {
    let fx = fixture(
        discogs_with_album(&["Intro", "Song"]),
        Arc::new(FakeLastfm::default()),
        FakeFetcher::new(FetchBehavior::Nothing),
        Settings::default(),
    );
    let track = expanded_track(&fx).await;
    let before = std::fs::read(&track).unwrap();

    let err = play(&fx, &track).await.unwrap_err();

    assert!(matches!(err, ExploreError::DownloadFailed(_)));
    assert_eq!(std::fs::read(&track).unwrap(), before);
}

#[tokio::test]
async fn test_download_replaces_placeholder_and_advances() {
    let fx = fixture(
        discogs_with_album(&["Intro", "Song"]),
        Arc::new(FakeLastfm::default()),
        FakeFetcher::new(FetchBehavior::Write(b"real opus audio".to_vec())),
        Settings::default(),
    );
    let track = expanded_track(&fx).await;

    let outcome = play(&fx, &track).await.unwrap();

    assert_eq!(
        outcome,
        ProcessOutcome::TrackLoaded {
            path: track.clone(),
            advanced: true,
        }
    );
    assert_eq!(std::fs::read(&track).unwrap(), b"real opus audio");
    assert_eq!(state_of(&fx, &track), State::Loaded);
    assert_eq!(fx.library.get_tag(&track, Tag::TrackTitle).as_deref(), Some("Intro"));
    assert_eq!(fx.library.now_playing(), Some(track.clone()));

    // Loaded items are left alone
    assert_eq!(play(&fx, &track).await.unwrap(), ProcessOutcome::AlreadyLoaded);
}

#[tokio::test]
async fn test_streaming_mode_leaves_placeholder() {
    let settings = Settings {
        use_media_player: true,
        ..Settings::default()
    };
    let fx = fixture(
        discogs_with_album(&["Intro", "Song"]),
        Arc::new(FakeLastfm::default()),
        FakeFetcher::streaming("https://stream.example/intro"),
        settings,
    );
    let track = expanded_track(&fx).await;
    let before = std::fs::read(&track).unwrap();

    let outcome = play(&fx, &track).await.unwrap();

    assert_eq!(
        outcome,
        ProcessOutcome::Streaming {
            url: "https://stream.example/intro".to_string()
        }
    );
    assert_eq!(
        *fx.player.played.lock().unwrap(),
        vec!["https://stream.example/intro".to_string()]
    );
    assert_eq!(std::fs::read(&track).unwrap(), before);
    assert_eq!(state_of(&fx, &track), State::UnloadedTrack);
}

#[tokio::test]
async fn test_link_plays_library_file_until_it_disappears() {
    let lastfm = Arc::new(FakeLastfm {
        top_tracks: vec![lf_track("Known Song", 200), lf_track("New Song", 180)],
        ..FakeLastfm::default()
    });
    let fx = fixture(
        Arc::new(FakeDiscogs::default()),
        lastfm,
        FakeFetcher::new(FetchBehavior::Fail),
        Settings::default(),
    );
    let real = add_library_file(
        &fx.library,
        fx.dir.path(),
        "known.opus",
        &[(Tag::Artist, "ArtistX"), (Tag::TrackTitle, "Known Song")],
    );
    fx.explorer
        .popular_tracks("ArtistX", &RecordingProgress::default(), &CancellationToken::new())
        .await
        .unwrap();
    let link = fx
        .explorer
        .paths()
        .cache_dir
        .join("ArtistX")
        .join("Popular Tracks")
        .join("01 - Known Song.opus");
    assert_eq!(state_of(&fx, &link), State::LinkTrack);

    let outcome = play(&fx, &link).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Linked { path: real.clone() });
    assert_eq!(fx.library.now_playing(), Some(real.clone()));

    std::fs::remove_file(&real).unwrap();
    let err = play(&fx, &link).await.unwrap_err();
    assert!(matches!(err, ExploreError::BrokenLink(path) if path == real));
}

#[tokio::test]
async fn test_files_outside_cache_are_not_managed() {
    let fx = fixture(
        Arc::new(FakeDiscogs::default()),
        Arc::new(FakeLastfm::default()),
        FakeFetcher::new(FetchBehavior::Fail),
        Settings::default(),
    );
    let real = add_library_file(&fx.library, fx.dir.path(), "song.opus", &[]);

    assert_eq!(play(&fx, &real).await.unwrap(), ProcessOutcome::NotManaged);
    assert_eq!(fx.library.play_state(), PlayState::Playing);
}
