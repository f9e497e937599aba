use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use playdeck::app::Session;
use playdeck::error::{FetchError, LibraryError};
use playdeck::library::{Playlist, TrackRef, ALL_PLAYLIST, FAVORITE_PLAYLIST, UNKNOWN_ARTIST};
use playdeck::metadata::{ByteSource, MetadataCache, TagFields, TagOutcome, TagReader};
use playdeck::player::{PlaybackEvent, PlaybackStatus, SilentOutput};
use playdeck::store::{DocumentPatch, KeyValueStore, MemoryStore, MetadataMap, PersistentStore};

const SAVE_DELAY: Duration = Duration::from_millis(800);
const KEY: &str = "Playlists";

const A: &str = "https://cdn.test/mix/a.mp3";
const B: &str = "https://cdn.test/mix/b.mp3";
const C: &str = "https://cdn.test/mix/c.mp3";
const POP_ONLY: &str = "https://cdn.test/pop/p1.mp3";
const SHARED: &str = "https://cdn.test/pop/shared.mp3";

struct StubFetcher;

impl ByteSource for StubFetcher {
    fn fetch_prefix<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        async { Ok(b"ID3\x04\x00".to_vec()) }.boxed()
    }
}

struct TitleReader;

impl TagReader for TitleReader {
    fn read(&self, _bytes: Vec<u8>) -> BoxFuture<'_, TagOutcome> {
        async {
            TagOutcome::Resolved(TagFields {
                title: Some("Tagged Title".into()),
                artist: Some("Tagged Artist".into()),
                picture: None,
            })
        }
        .boxed()
    }
}

struct Harness {
    backend: Arc<MemoryStore>,
    session: Session,
}

fn builtins() -> Vec<Playlist> {
    vec![
        Playlist::with_tracks("Pop", [POP_ONLY, SHARED]),
        Playlist::new("Peace"),
    ]
}

fn harness_with(builtin: Vec<Playlist>, reader: Option<Arc<dyn TagReader>>) -> Harness {
    let backend = Arc::new(MemoryStore::new());
    let store = Arc::new(PersistentStore::new(backend.clone(), KEY));
    let cache = Arc::new(MetadataCache::new(
        Arc::clone(&store),
        Arc::new(StubFetcher),
        reader,
        SAVE_DELAY,
    ));
    let session = Session::new(store, cache, builtin, Box::new(SilentOutput::new()));
    Harness { backend, session }
}

fn harness() -> Harness {
    harness_with(builtins(), None)
}

fn mix(h: &mut Harness, urls: &[&str]) {
    h.session.create_playlist("Mix").unwrap();
    for url in urls {
        h.session.add_track("Mix", url).unwrap();
    }
}

fn urls(tracks: &[TrackRef]) -> Vec<&str> {
    tracks.iter().map(TrackRef::as_str).collect()
}

fn playing(h: &Harness) -> Option<&str> {
    h.session.playback().playing_track.as_ref().map(TrackRef::as_str)
}

#[tokio::test]
async fn test_starts_on_first_builtin() {
    let h = harness();
    assert_eq!(h.session.selected(), "Pop");
    assert_eq!(urls(&h.session.displayed()), [POP_ONLY, SHARED]);
    assert_eq!(
        h.session.playlist_names(),
        [ALL_PLAYLIST, FAVORITE_PLAYLIST, "Pop", "Peace"]
    );
    assert_eq!(h.session.playback().status, PlaybackStatus::Idle);
}

#[tokio::test]
async fn test_favorites_next_wraps_around() {
    let mut h = harness();
    for url in ["A.mp3", "B.mp3", "C.mp3"] {
        assert!(h.session.add_favorite(url));
    }
    h.session.select_playlist(FAVORITE_PLAYLIST);
    assert!(h.session.play_index(1));
    assert_eq!(playing(&h), Some("B.mp3"));

    h.session.next();
    assert_eq!(playing(&h), Some("C.mp3"));
    h.session.next();
    assert_eq!(playing(&h), Some("A.mp3"));
    h.session.previous();
    assert_eq!(playing(&h), Some("C.mp3"));
}

#[tokio::test]
async fn test_switching_playlists_leaves_playback_alone() {
    let mut h = harness();
    mix(&mut h, &[A, B]);
    h.session.select_playlist("Pop");
    h.session.play_index(0);
    h.session.handle_event(PlaybackEvent::DurationKnown(200.0));
    h.session.handle_event(PlaybackEvent::TimeUpdate(37.0));
    let before = h.session.playback().clone();

    for name in [FAVORITE_PLAYLIST, ALL_PLAYLIST, "Mix", "Peace", "nope", "Pop"] {
        h.session.select_playlist(name);
        assert_eq!(h.session.playback(), &before);
    }
}

#[tokio::test]
async fn test_next_outside_displayed_list_is_noop() {
    let mut h = harness();
    mix(&mut h, &[A, B]);
    h.session.select_playlist("Mix");
    h.session.play_index(0);

    h.session.select_playlist("Pop");
    assert!(!h.session.next());
    assert!(!h.session.previous());
    assert_eq!(playing(&h), Some(A));
}

#[tokio::test]
async fn test_removing_playing_track_moves_on() {
    let mut h = harness();
    mix(&mut h, &[A, B, C]);
    h.session.select_playlist("Mix");
    h.session.play_index(1);
    assert_eq!(playing(&h), Some(B));

    h.session.remove_track("Mix", 1).unwrap();
    assert_eq!(playing(&h), Some(C));
    assert_eq!(h.session.playback().status, PlaybackStatus::Loading);

    h.session.remove_track("Mix", 1).unwrap();
    assert_eq!(playing(&h), Some(A));

    h.session.remove_track("Mix", 0).unwrap();
    assert_eq!(h.session.playback().status, PlaybackStatus::Idle);
    assert!(playing(&h).is_none());
    assert!(h.session.player().output().source().is_none());
}

#[tokio::test]
async fn test_removal_from_other_collection_keeps_playing() {
    let mut h = harness();
    mix(&mut h, &[A, B]);
    h.session.add_favorite(B);
    h.session.select_playlist("Mix");
    h.session.play_index(1);

    assert!(h.session.remove_favorite(B));
    assert_eq!(playing(&h), Some(B));
    assert_eq!(h.session.player().source(), Some("Mix"));
}

#[tokio::test]
async fn test_unfavoriting_playing_favorite() {
    let mut h = harness();
    for url in [A, B, C] {
        h.session.add_favorite(url);
    }
    h.session.select_playlist(FAVORITE_PLAYLIST);
    h.session.play_index(2);

    h.session.remove_favorite(C);
    assert_eq!(playing(&h), Some(B));
    assert_eq!(urls(&h.session.displayed()), [A, B]);
}

#[tokio::test]
async fn test_remove_out_of_range_is_silent() {
    let mut h = harness();
    mix(&mut h, &[]);
    assert_eq!(h.session.remove_track("Mix", 0), Ok(()));
    assert_eq!(h.session.remove_track(FAVORITE_PLAYLIST, 3), Ok(()));
    assert_eq!(
        h.session.remove_track("Pop", 0),
        Err(LibraryError::ReadOnly("Pop".into()))
    );
}

#[tokio::test]
async fn test_forget_cascades_everywhere() {
    let mut h = harness();
    mix(&mut h, &[A, B, A]);
    h.session.add_favorite(A);
    let a = TrackRef::from(A);
    h.session.cache().resolve_now(&a).await;
    assert!(h.session.cache().contains(&a));

    assert!(h.session.forget(A));
    assert!(!h.session.is_favorite(A));
    h.session.select_playlist("Mix");
    assert_eq!(urls(&h.session.displayed()), [B]);
    assert!(!h.session.cache().contains(&a));
    assert!(!h.session.store().read().metadata.contains_key(&a));

    h.session.select_playlist(ALL_PLAYLIST);
    assert!(!h.session.displayed().contains(&a));

    // Re-added later it starts over with no metadata
    h.session.add_track("Mix", A).unwrap();
    assert!(!h.session.cache().contains(&a));
}

#[tokio::test]
async fn test_forget_keeps_metadata_a_builtin_still_lists() {
    let mut h = harness();
    let shared = TrackRef::from(SHARED);
    h.session.add_favorite(SHARED);
    h.session.cache().resolve_now(&shared).await;

    h.session.forget(SHARED);
    assert!(!h.session.is_favorite(SHARED));
    assert!(h.session.cache().contains(&shared));
    h.session.select_playlist("Pop");
    assert!(h.session.displayed().contains(&shared));
}

#[tokio::test]
async fn test_forget_playing_track_from_all_view() {
    let mut h = harness();
    mix(&mut h, &[A, B]);
    for url in [A, B] {
        h.session.cache().resolve_now(&TrackRef::from(url)).await;
    }
    h.session.select_playlist(ALL_PLAYLIST);
    let index = h
        .session
        .displayed()
        .iter()
        .position(|t| t.as_str() == A)
        .unwrap();
    h.session.play_index(index);

    h.session.forget(A);
    let now = h.session.playback().playing_track.clone();
    assert!(now.is_some());
    assert_ne!(now.as_ref().map(TrackRef::as_str), Some(A));
    assert!(h.session.displayed().contains(now.as_ref().unwrap()));
}

#[tokio::test]
async fn test_unreferenced_track_loses_metadata_on_removal() {
    let mut h = harness();
    mix(&mut h, &[A]);
    h.session.add_favorite(A);
    let a = TrackRef::from(A);
    h.session.cache().resolve_now(&a).await;

    h.session.remove_track("Mix", 0).unwrap();
    assert!(h.session.cache().contains(&a), "still a favorite");

    h.session.remove_favorite(A);
    assert!(!h.session.cache().contains(&a));
}

#[tokio::test]
async fn test_writes_keep_sibling_fields() {
    let mut h = harness_with(Vec::new(), None);
    h.backend
        .set(
            KEY,
            r#"{"favoritePlaylist":[],"metadata":{},"playlists":[],"theme":"dark"}"#,
        )
        .unwrap();

    let x = TrackRef::from("https://cdn.test/x.mp3");
    h.session.cache().resolve_now(&x).await;
    assert!(h.session.store().has_pending_write());

    h.session.add_favorite("https://cdn.test/y.mp3");
    h.session.store().flush();

    let doc = h.session.store().read();
    assert!(doc.metadata.contains_key(&x));
    assert_eq!(urls(&doc.favorite_playlist), ["https://cdn.test/y.mp3"]);
    let raw = h.backend.get(KEY).unwrap().unwrap();
    assert!(raw.contains(r#""theme":"dark""#));
}

#[tokio::test(start_paused = true)]
async fn test_metadata_burst_is_one_write() {
    let h = harness_with(Vec::new(), None);
    let writes = h.backend.write_count();

    for i in 0..5 {
        let track = TrackRef::new(format!("https://cdn.test/burst/{}.mp3", i));
        h.session.cache().resolve_now(&track).await;
    }
    assert_eq!(h.backend.write_count(), writes);

    tokio::time::sleep(SAVE_DELAY + Duration::from_millis(1)).await;
    assert_eq!(h.backend.write_count(), writes + 1);
    assert_eq!(h.session.store().read().metadata.len(), 5);
}

#[tokio::test]
async fn test_missing_tag_reader_uses_filename() {
    let h = harness();
    let meta = h
        .session
        .cache()
        .resolve_now(&TrackRef::from("https://cdn.test/x.mp3"))
        .await
        .unwrap();
    assert_eq!(meta.title, "x.mp3");
    assert_eq!(meta.artist, UNKNOWN_ARTIST);
    assert!(meta.picture.is_none());
}

#[tokio::test]
async fn test_tag_reader_fills_metadata() {
    let h = harness_with(Vec::new(), Some(Arc::new(TitleReader) as Arc<dyn TagReader>));
    let track = TrackRef::from(A);
    h.session.cache().resolve_now(&track).await;
    let meta = h.session.metadata_for(&track).unwrap();
    assert_eq!(meta.title, "Tagged Title");
    assert_eq!(meta.artist, "Tagged Artist");
}

#[tokio::test]
async fn test_all_view_follows_resolution_order() {
    let mut h = harness_with(Vec::new(), None);
    for url in [C, A, B] {
        h.session.cache().resolve_now(&TrackRef::from(url)).await;
    }
    h.session.select_playlist(ALL_PLAYLIST);
    assert_eq!(urls(&h.session.displayed()), [C, A, B]);
}

#[tokio::test]
async fn test_equal_lists_are_not_republished() {
    let mut h = harness();
    h.session.select_playlist(FAVORITE_PLAYLIST);
    let mut rx = h.session.subscribe_displayed();

    h.session.select_playlist("Peace");
    assert!(!rx.has_changed().unwrap());

    h.session.add_favorite(A);
    h.session.select_playlist(FAVORITE_PLAYLIST);
    assert!(rx.has_changed().unwrap());
    assert_eq!(urls(&rx.borrow_and_update()), [A]);
}

#[tokio::test]
async fn test_playlist_name_rules() {
    let mut h = harness();
    assert_eq!(h.session.create_playlist("   "), Err(LibraryError::EmptyName));
    assert_eq!(
        h.session.create_playlist("All"),
        Err(LibraryError::ReservedName("All".into()))
    );
    assert_eq!(
        h.session.create_playlist("Pop"),
        Err(LibraryError::ReservedName("Pop".into()))
    );
    h.session.create_playlist("  Road Trip ").unwrap();
    assert_eq!(
        h.session.create_playlist("Road Trip"),
        Err(LibraryError::DuplicateName("Road Trip".into()))
    );
    assert!(h.session.playlist_names().contains(&"Road Trip".to_string()));

    assert_eq!(
        h.session.delete_playlist("Peace"),
        Err(LibraryError::ReadOnly("Peace".into()))
    );
    assert_eq!(
        h.session.delete_playlist("Gone"),
        Err(LibraryError::UnknownPlaylist("Gone".into()))
    );
}

#[tokio::test]
async fn test_delete_selected_playlist_falls_back() {
    let mut h = harness();
    h.session.create_playlist("Mix").unwrap();
    h.session.create_playlist("Road").unwrap();

    h.session.select_playlist("Road");
    h.session.delete_playlist("Road").unwrap();
    assert_eq!(h.session.selected(), "Mix");

    h.session.delete_playlist("Mix").unwrap();
    assert_eq!(h.session.selected(), "Pop");

    let mut bare = harness_with(Vec::new(), None);
    bare.session.create_playlist("Solo").unwrap();
    bare.session.select_playlist("Solo");
    bare.session.delete_playlist("Solo").unwrap();
    assert_eq!(bare.session.selected(), FAVORITE_PLAYLIST);
}

#[tokio::test]
async fn test_deleting_source_playlist_stops_playback() {
    let mut h = harness();
    mix(&mut h, &[A, B]);
    h.session.select_playlist("Mix");
    h.session.play_index(0);

    h.session.delete_playlist("Mix").unwrap();
    assert_eq!(h.session.playback().status, PlaybackStatus::Idle);
    assert!(playing(&h).is_none());
}

#[tokio::test]
async fn test_add_track_rules() {
    let mut h = harness();
    assert_eq!(
        h.session.add_track("Pop", A),
        Err(LibraryError::ReadOnly("Pop".into()))
    );
    assert_eq!(
        h.session.add_track("Mix", A),
        Err(LibraryError::UnknownPlaylist("Mix".into()))
    );

    mix(&mut h, &[]);
    h.session.add_track("Mix", "   ").unwrap();
    h.session.add_track("Mix", &format!("  {}  ", A)).unwrap();
    h.session.add_track("Mix", A).unwrap();
    h.session.select_playlist("Mix");
    assert_eq!(urls(&h.session.displayed()), [A, A]);
}

#[tokio::test]
async fn test_toggle_favorite() {
    let mut h = harness();
    assert!(h.session.toggle_favorite(A));
    assert!(h.session.is_favorite(A));
    assert!(!h.session.add_favorite(A));
    assert_eq!(h.session.store().read().favorite_playlist.len(), 1);
    assert!(!h.session.toggle_favorite(A));
    assert!(!h.session.is_favorite(A));
}

#[tokio::test]
async fn test_end_of_track_advances_then_idles() {
    let mut h = harness();
    mix(&mut h, &[A, B]);
    h.session.select_playlist("Mix");
    h.session.play_index(0);
    h.session.handle_event(PlaybackEvent::Started);
    assert!(h.session.playback().is_playing());

    h.session.handle_event(PlaybackEvent::Ended);
    assert_eq!(playing(&h), Some(B));

    h.session.select_playlist("Peace");
    h.session.handle_event(PlaybackEvent::Ended);
    assert_eq!(h.session.playback().status, PlaybackStatus::Idle);
}

#[tokio::test]
async fn test_sync_adopts_external_metadata() {
    let mut h = harness_with(Vec::new(), None);
    let other = PersistentStore::new(h.backend.clone(), KEY);
    let ext = TrackRef::from("https://cdn.test/ext.mp3");
    let mut incoming = MetadataMap::new();
    incoming.insert(ext.clone(), playdeck::library::Metadata::fallback(&ext));
    other.try_merge_write(DocumentPatch::metadata(incoming)).unwrap();

    let doc = h.session.store().read();
    assert_eq!(h.session.sync_from_store(&doc), 1);
    assert_eq!(h.session.sync_from_store(&doc), 0);
    h.session.select_playlist(ALL_PLAYLIST);
    assert_eq!(urls(&h.session.displayed()), [ext.as_str()]);
}

#[tokio::test]
async fn test_sync_reassigns_after_external_removal() {
    let mut h = harness();
    mix(&mut h, &[A, B, C]);
    h.session.select_playlist("Mix");
    h.session.play_index(1);

    let other = PersistentStore::new(h.backend.clone(), KEY);
    let mut playlists = other.read().playlists;
    playlists[0].tracks.retain(|t| t.as_str() != B);
    other.try_merge_write(DocumentPatch::playlists(playlists)).unwrap();

    let doc = h.session.store().read();
    h.session.sync_from_store(&doc);
    assert_eq!(playing(&h), Some(C));
    assert_eq!(urls(&h.session.displayed()), [A, C]);
}

#[tokio::test]
async fn test_forget_elsewhere_is_not_undone_by_our_writes() {
    let mut here = harness_with(Vec::new(), None);
    let store = Arc::new(PersistentStore::new(here.backend.clone(), KEY));
    let cache = Arc::new(MetadataCache::new(
        Arc::clone(&store),
        Arc::new(StubFetcher),
        None,
        SAVE_DELAY,
    ));

    here.session.select_playlist(ALL_PLAYLIST);
    for url in [A, B] {
        here.session.cache().resolve_now(&TrackRef::from(url)).await;
    }
    here.session.store().flush();

    let mut there = Session::new(store, cache, Vec::new(), Box::new(SilentOutput::new()));
    there.select_playlist(ALL_PLAYLIST);
    assert_eq!(urls(&there.displayed()), [A, B]);
    assert!(there.forget(A));

    let doc = here.session.store().read();
    here.session.sync_from_store(&doc);
    assert_eq!(urls(&here.session.displayed()), [B]);

    here.session.cache().resolve_now(&TrackRef::from(C)).await;
    here.session.store().flush();
    let stored: Vec<TrackRef> = here.session.store().read().metadata.keys().cloned().collect();
    assert_eq!(urls(&stored), [B, C]);
}

#[tokio::test]
async fn test_metadata_written_elsewhere_survives_our_flush() {
    let h = harness_with(Vec::new(), None);
    h.session.cache().resolve_now(&TrackRef::from(A)).await;

    let other = PersistentStore::new(h.backend.clone(), KEY);
    let ext = TrackRef::from("https://cdn.test/ext.mp3");
    let mut incoming = MetadataMap::new();
    incoming.insert(ext.clone(), playdeck::library::Metadata::fallback(&ext));
    other.try_merge_write(DocumentPatch::metadata(incoming)).unwrap();

    h.session.store().flush();
    let stored: Vec<TrackRef> = h.session.store().read().metadata.keys().cloned().collect();
    assert_eq!(urls(&stored), [ext.as_str(), A]);
}

#[tokio::test]
async fn test_shutdown_flushes_and_releases() {
    let h = harness_with(Vec::new(), None);
    h.session
        .cache()
        .resolve_now(&TrackRef::from(A))
        .await;
    assert!(h.session.store().read().metadata.is_empty());

    h.session.shutdown();
    assert_eq!(h.session.store().read().metadata.len(), 1);
    assert!(h.session.cache().is_released());
    assert!(h.session.cache().resolve(&TrackRef::from(B)).is_none());
}

#[tokio::test]
async fn test_seek_and_loop_through_session() {
    let mut h = harness();
    h.session.play_index(0);
    h.session.handle_event(PlaybackEvent::DurationKnown(100.0));
    h.session.handle_event(PlaybackEvent::BufferProgress(25.0));
    assert_eq!(h.session.playback().buffered_percent, 25.0);

    h.session.seek(40.0);
    assert_eq!(h.session.playback().progress_secs, 40.0);
    assert_eq!(h.session.playback().time_label(), "00:40 / 01:40");

    h.session.toggle_loop();
    h.session.handle_event(PlaybackEvent::Ended);
    assert_eq!(playing(&h), Some(POP_ONLY));

    h.session.toggle_play_pause();
    assert_eq!(h.session.playback().status, PlaybackStatus::Paused);
}
