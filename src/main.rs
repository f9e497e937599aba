use anyhow::Result;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;

use playdeck::app::cli::{Args, Command};
use playdeck::app::{Session, Settings};
use playdeck::library::{TrackRef, ALL_PLAYLIST};
use playdeck::player::SilentOutput;

/// Logs go to `~/.cache/playdeck/playdeck.log`, or to stderr with `--verbose`.
fn init_logging(verbose: bool) -> Result<Option<WorkerGuard>> {
    if verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .init();
        return Ok(None);
    }

    let log_dir = Settings::log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::never(&log_dir, "playdeck.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(file_writer)
        .with_max_level(Level::INFO)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    human_panic::setup_panic!();

    let args = Args::parse();

    if args.generate_config {
        print!("{}", Settings::default().to_toml()?);
        return Ok(());
    }

    let _log_guard = init_logging(args.verbose)?;
    let settings = Settings::load(args.config.as_deref());
    let mut session = Session::from_settings(&settings, Box::new(SilentOutput::new()))?;

    let command = args.command.unwrap_or(Command::Playlists);
    let result = run(&mut session, &settings, command).await;
    session.shutdown();
    result
}

async fn run(session: &mut Session, settings: &Settings, command: Command) -> Result<()> {
    match command {
        Command::Playlists => {
            for name in session.playlist_names() {
                println!("{}", name);
            }
        }
        Command::Show { name } => {
            session.select_playlist(name.unwrap_or_else(|| ALL_PLAYLIST.to_string()));
            print_displayed(session);
        }
        Command::Create { name } => {
            session.create_playlist(&name)?;
            println!("Created \"{}\"", name.trim());
        }
        Command::Delete { name } => {
            session.delete_playlist(&name)?;
            println!("Deleted \"{}\"", name);
        }
        Command::Add { playlist, url } => {
            session.add_track(&playlist, &url)?;
            session.cache().resolve_now(&TrackRef::new(url.trim())).await;
            session.select_playlist(playlist);
            print_displayed(session);
        }
        Command::Remove { playlist, index } => {
            session.remove_track(&playlist, index)?;
            session.select_playlist(playlist);
            print_displayed(session);
        }
        Command::Favorite { url } => {
            if session.add_favorite(&url) {
                session.cache().resolve_now(&TrackRef::new(url)).await;
                println!("Added to favorites");
            } else {
                println!("Already a favorite");
            }
        }
        Command::Unfavorite { url } => {
            if session.remove_favorite(&url) {
                println!("Removed from favorites");
            } else {
                println!("Not a favorite");
            }
        }
        Command::Forget { url } => {
            if session.forget(&url) {
                println!("Forgot {}", url);
            } else {
                println!("Nothing to forget");
            }
        }
        Command::Resolve { name } => {
            session.select_playlist(name.unwrap_or_else(|| ALL_PLAYLIST.to_string()));
            let resolved = session.resolve_displayed().await;
            info!(resolved, "metadata resolved");
            print_displayed(session);
        }
        Command::Watch { name } => {
            session.select_playlist(name.unwrap_or_else(|| ALL_PLAYLIST.to_string()));
            watch(session, settings).await?;
        }
    }
    Ok(())
}

/// Reprints the selected playlist on every store change or resolved track,
/// until Ctrl-C.
async fn watch(session: &mut Session, settings: &Settings) -> Result<()> {
    let mut stored = session.store().watch(settings.store_poll());
    let mut resolved = session.cache().subscribe();
    let mut displayed = session.subscribe_displayed();
    print_displayed(session);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = stored.changed() => {
                if changed.is_err() {
                    break;
                }
                let doc = stored.borrow_and_update().clone();
                session.sync_from_store(&doc);
            }
            event = resolved.recv() => match event {
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    session.refresh();
                }
                Err(RecvError::Closed) => break,
            },
        }
        if displayed.has_changed().unwrap_or(false) {
            displayed.mark_unchanged();
            print_displayed(session);
        }
    }
    Ok(())
}

fn print_displayed(session: &Session) {
    println!("== {} ==", session.selected());
    for (index, track) in session.displayed().iter().enumerate() {
        match session.metadata_for(track) {
            Some(meta) => println!("{:>3}  {} - {}  <{}>", index, meta.artist, meta.title, track),
            None => println!("{:>3}  {}", index, track),
        }
    }
}
