mod config;
mod error;
mod filesystem;

use config::AppConfig;
use error::AppError;
use filesystem::DirectoryStore;
use gallery_access::{
    GalleryAccess, GalleryError, ImageId, IndexReadyListener, IndexStatus, MainQueue, MediaIndex,
    PickerResult, PickerSession, SelectionMode, SelectionOutcome, Thumbnail, ThumbnailError,
    ThumbnailReceiver,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;

/// Grid cells whose thumbnails are requested up front
const FIRST_PAGE: usize = 12;

const USAGE: &str = "usage: image-picker <photo-dir> [--config picker.toml] \
[--mode single|single-wait|multi|multi-long-press] [--max N]";

const HELP: &str = "commands: list | bucket <n> | tap <n> | long <n> | done | close | help";

#[derive(Debug, Default)]
struct Args {
    root: PathBuf,
    config: Option<PathBuf>,
    mode: Option<SelectionMode>,
    max: Option<usize>,
}

fn parse_mode(value: &str) -> Result<SelectionMode, AppError> {
    match value {
        "single" => Ok(SelectionMode::SingleImmediate),
        "single-wait" => Ok(SelectionMode::SingleWait),
        "multi" => Ok(SelectionMode::Multi),
        "multi-long-press" => Ok(SelectionMode::MultiLongPress),
        other => Err(AppError::Usage(format!("unknown mode '{}'\n{}", other, USAGE))),
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, AppError> {
    let mut parsed = Args::default();
    let mut root = None;

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .ok_or_else(|| AppError::Usage(format!("{} needs a value\n{}", flag, USAGE)))
        };
        match arg.as_str() {
            "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
            "--mode" => parsed.mode = Some(parse_mode(&value("--mode")?)?),
            "--max" => {
                let raw = value("--max")?;
                let max = raw
                    .parse()
                    .map_err(|_| AppError::Usage(format!("invalid --max '{}'", raw)))?;
                parsed.max = Some(max);
            }
            "-h" | "--help" => return Err(AppError::Usage(USAGE.to_string())),
            _ if root.is_none() => root = Some(PathBuf::from(&arg)),
            _ => return Err(AppError::Usage(format!("unexpected argument '{}'\n{}", arg, USAGE))),
        }
    }

    parsed.root = root.ok_or_else(|| AppError::Usage(USAGE.to_string()))?;
    Ok(parsed)
}

fn init_logging() {
    #[cfg(target_os = "android")]
    android_logger::init_once(
        android_logger::Config::default().with_max_level(log::LevelFilter::Debug),
    );

    #[cfg(not(target_os = "android"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Prints the album list once the index is ready
struct BucketPrinter;

impl IndexReadyListener for BucketPrinter {
    fn on_index_ready(&self, index: &Arc<MediaIndex>) {
        println!("{} images", index.image_count());
        for (i, bucket) in index.buckets().iter().enumerate() {
            println!("  bucket {}: {} ({} images)", i + 1, bucket.name, bucket.len());
        }
    }

    fn on_index_failed(&self, error: &GalleryError) {
        log::error!("Gallery unavailable: {}", error);
    }
}

/// Counts thumbnails as they arrive
#[derive(Default)]
struct ThumbnailTally {
    ready: AtomicUsize,
    failed: AtomicUsize,
}

impl ThumbnailReceiver for ThumbnailTally {
    fn on_thumbnail_ready(&self, id: ImageId, thumbnail: Arc<Thumbnail>) {
        self.ready.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Thumbnail {} ready: {}x{}",
            id,
            thumbnail.width(),
            thumbnail.height()
        );
    }

    fn on_thumbnail_failed(&self, id: ImageId, error: &ThumbnailError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        log::warn!("No thumbnail for {}: {}", id, error);
    }
}

fn request_visible_thumbnails(
    gallery: &GalleryAccess,
    session: &PickerSession,
    tally: &Arc<ThumbnailTally>,
) {
    for position in 0..session.visible_count().min(FIRST_PAGE) {
        if let Ok(Some(record)) = session.image_at(position) {
            gallery.get_thumbnail(record.id, tally);
        }
    }
}

fn print_grid(gallery: &GalleryAccess, session: &PickerSession, tally: &ThumbnailTally) {
    let selection = session.selection();
    for position in 0..session.visible_count() {
        if let Ok(Some(record)) = session.image_at(position) {
            let mark = if selection.contains(record.id) { "x" } else { " " };
            println!("  [{}] {:>3} {}", mark, position, record.display_name);
        }
    }
    let (used, capacity) = gallery.thumbnails().cache_usage();
    println!(
        "{} selected, {} thumbnails loaded, {} failed, cache {}/{} KiB",
        selection.len(),
        tally.ready.load(Ordering::Relaxed),
        tally.failed.load(Ordering::Relaxed),
        used / 1024,
        capacity / 1024
    );
}

async fn wait_for_index(gallery: &GalleryAccess, main: &mut MainQueue) -> Result<(), AppError> {
    // Both a finished and a failed build post to the completion context
    while matches!(gallery.status(), IndexStatus::Unbuilt | IndexStatus::Building) {
        if !main.run_next().await {
            break;
        }
    }
    gallery.index()?;
    main.run_pending();
    Ok(())
}

fn parse_position(arg: Option<&str>) -> Option<usize> {
    arg.and_then(|a| a.parse().ok())
}

/// Handle one command line; returns the result once the picker is done
fn handle_command(
    line: &str,
    gallery: &GalleryAccess,
    session: &mut PickerSession,
    tally: &Arc<ThumbnailTally>,
) -> Result<Option<PickerResult>, AppError> {
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let position = parse_position(words.next());

    match (command, position) {
        ("", _) => {}
        ("list", _) => print_grid(gallery, session, tally),
        ("bucket", Some(n)) => {
            session.select_spinner(n);
            request_visible_thumbnails(gallery, session, tally);
            print_grid(gallery, session, tally);
        }
        ("tap", Some(n)) => match session.tap(n)? {
            SelectionOutcome::Finished(_) => return Ok(session.result().cloned()),
            SelectionOutcome::Unchanged => println!("selection unchanged"),
            SelectionOutcome::Ignored => println!("no image at {}", n),
            SelectionOutcome::Changed => print_grid(gallery, session, tally),
        },
        ("long", Some(n)) => match session.long_press(n)? {
            SelectionOutcome::Ignored => println!("long press does nothing here"),
            _ => print_grid(gallery, session, tally),
        },
        ("done", _) => match session.done() {
            Some(result) => return Ok(Some(result)),
            None => println!("nothing selected"),
        },
        ("close", _) => return Ok(Some(session.close())),
        ("help", _) => {
            println!("{}", HELP);
            for (i, entry) in session.spinner_entries().iter().enumerate() {
                println!("  bucket {} = {}", i, entry);
            }
        }
        _ => println!("{}", HELP),
    }
    Ok(None)
}

async fn run(args: Args) -> Result<PickerResult, AppError> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        config.picker.selection_mode = mode;
    }
    if let Some(max) = args.max {
        config.picker.max_selection_count = max;
    }
    let picker_config = config.picker;

    log::info!(
        "Opening {:?} ({:?}, max {})",
        args.root,
        picker_config.selection_mode,
        picker_config.max_selection_count
    );

    let store = Arc::new(DirectoryStore::new(&args.root));
    let (gallery, mut main) = GalleryAccess::start(config.gallery, store, Handle::current());

    let printer = Arc::new(BucketPrinter);
    gallery.register_ready_listener(&printer)?;
    let mut session = PickerSession::launch(Arc::clone(&gallery), picker_config);

    wait_for_index(&gallery, &mut main).await?;

    let tally = Arc::new(ThumbnailTally::default());
    request_visible_thumbnails(&gallery, &session, &tally);
    print_grid(&gallery, &session, &tally);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(session.close());
                };
                if let Some(result) = handle_command(&line, &gallery, &mut session, &tally)? {
                    return Ok(result);
                }
            }
            _ = main.run_next() => {}
        }
    }
}

fn main() {
    init_logging();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e.user_message());
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(args)) {
        Ok(result) => match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => log::error!("Failed to encode result: {}", e),
        },
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    }
}
