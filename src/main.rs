use iced::futures::channel::mpsc;
use iced::widget::image::Handle as ImageHandle;
use iced::widget::{button, column, progress_bar, row, text, Column};
use iced::{window, Alignment, Element, Length, Size, Subscription, Task, Theme};
use rfd::FileDialog;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// Declare the modules
mod ingest;
mod state;
mod ui;
mod viewer;

use ingest::thumbnail::{generate_thumbnail, Thumbnail};
use ingest::{CancelToken, Classifier, IngestError, IngestPipeline, IngestReport};
use state::config::AppConfig;
use state::data::RawFile;
use state::handles::HandleAllocator;
use state::library::Library;
use state::store::{self, SharedStore, SqliteStore};
use ui::grid::Thumbnails;
use ui::viewer::ViewerScreen;
use viewer::{Camera, EquirectRenderer, LoadOutcome, Phase, ViewerController, ViewerError};

/// Mount point the renderer draws into
const VIEWER_MOUNT: &str = "viewer";

/// Auto-rotate frame interval (~30 Hz)
const TICK: Duration = Duration::from_millis(33);

const INITIAL_WINDOW: Size = Size::new(1280.0, 800.0);

/// Views are projected at a fraction of the window size and scaled up to fill it
const RENDER_SCALE: f32 = 0.5;

/// Height of the viewer's control bar
const CONTROLS_HEIGHT: f32 = 56.0;

const IMAGE_EXTENSIONS: [&str; 9] = ["jpg", "jpeg", "png", "webp", "bmp", "gif", "tif", "tiff", "avif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Grid,
    Viewer,
}

/// An ingestion run in flight
struct IngestProgress {
    considered: usize,
    total: usize,
    cancel: CancelToken,
}

/// Main application state
struct PanoramaApp {
    /// The in-memory working set shown in the grid
    library: Library,
    /// Durable store (or the session-only fallback)
    store: SharedStore,
    config: AppConfig,
    viewer: ViewerController<EquirectRenderer>,
    screen: Screen,
    ingest: Option<IngestProgress>,
    thumbnails: Thumbnails,

    // ========== Viewer navigation ==========
    camera: Camera,
    /// Last projected view of the current session
    frame: Option<ImageHandle>,
    last_tick: Option<Instant>,
    window_size: Size,
    fullscreen: bool,

    /// Status message to display to the user
    status: String,
    /// Non-fatal notice (e.g. storage unavailable)
    warning: Option<String>,
}

/// Application messages (events)
#[derive(Debug, Clone)]
pub enum Message {
    /// User clicked "Select Files"
    SelectFiles,
    /// User clicked "Import Folder"
    ImportFolder,
    /// Picked files were read into memory
    FilesRead(Vec<RawFile>),
    /// Running count of images considered by the current ingestion
    IngestProgress(usize),
    IngestFinished(Result<IngestReport, IngestError>),
    CancelIngest,
    ThumbnailReady(String, Option<Thumbnail>),
    DismissWarning,

    /// A grid tile was clicked
    OpenViewer(String),
    /// The renderer reported ready or error
    ViewerLoaded(LoadOutcome),
    /// Close the viewer and return to the grid
    Back,
    Tick(Instant),
    /// Drag as a fraction of the view width
    Drag(cgmath::Vector2<f32>),
    /// Zoom steps, positive zooms in
    Zoom(f32),
    ToggleAutoRotate(bool),
    ToggleFullscreen,
    WindowResized(Size),
}

impl PanoramaApp {
    /// Create a new instance of the application
    fn new() -> (Self, Task<Message>) {
        // A store that cannot be opened degrades to session-only mode
        let (store, warning) = store::open_or_fallback(SqliteStore::open_default());
        Self::with_store(store, warning)
    }

    fn with_store(store: SharedStore, warning: Option<String>) -> (Self, Task<Message>) {
        let handles = HandleAllocator::new();

        let config = match store.lock().load_config() {
            Ok(Some(config)) => config,
            Ok(None) => AppConfig::default(),
            Err(e) => {
                tracing::warn!("⚠️  Could not read settings, using defaults: {e}");
                AppConfig::default()
            }
        };

        let mut library = Library::new(handles.clone());
        if let Err(e) = library.load_from(store.lock().as_ref()) {
            tracing::warn!("⚠️  Could not load library: {e}");
        }

        let status = format!("Ready. {} panoramas in library.", library.len());
        tracing::info!("🎨 Panorama Viewer initialized with {} panoramas", library.len());

        let app = PanoramaApp {
            library,
            store,
            viewer: ViewerController::new(EquirectRenderer, handles, config.viewer, VIEWER_MOUNT),
            camera: Camera::from_config(&config.viewer),
            config,
            screen: Screen::Grid,
            ingest: None,
            thumbnails: Thumbnails::new(),
            frame: None,
            last_tick: None,
            window_size: INITIAL_WINDOW,
            fullscreen: false,
            status,
            warning,
        };
        let thumbnails = app.load_thumbnails();

        (app, thumbnails)
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::SelectFiles => {
                if self.ingest.is_some() {
                    return Task::none();
                }

                // Show the native multi-file picker, filtered to images
                let picked = FileDialog::new()
                    .set_title("Select Panoramas")
                    .add_filter("Images", &IMAGE_EXTENSIONS)
                    .pick_files();

                match picked {
                    Some(paths) => {
                        self.status = format!("Reading {} files...", paths.len());
                        Task::perform(ingest::source::read_files(paths), Message::FilesRead)
                    }
                    None => Task::none(),
                }
            }
            Message::ImportFolder => {
                if self.ingest.is_some() {
                    return Task::none();
                }

                let folder = FileDialog::new()
                    .set_title("Select Folder with Panoramas")
                    .pick_folder();

                match folder {
                    Some(folder) => {
                        self.status = format!("Scanning {}...", folder.display());
                        Task::perform(
                            async move {
                                let paths = tokio::task::spawn_blocking(move || ingest::source::collect_folder(&folder))
                                    .await
                                    .unwrap_or_default();
                                ingest::source::read_files(paths).await
                            },
                            Message::FilesRead,
                        )
                    }
                    None => Task::none(),
                }
            }
            Message::FilesRead(files) => self.start_ingest(files),
            Message::IngestProgress(considered) => {
                if let Some(ingest) = &mut self.ingest {
                    ingest.considered = considered;
                }
                Task::none()
            }
            Message::IngestFinished(result) => {
                self.ingest = None;
                match result {
                    Ok(report) => self.finish_ingest(report),
                    Err(IngestError::Cancelled { considered }) => {
                        self.status = format!("Import cancelled after {considered} images. Nothing was saved.");
                        Task::none()
                    }
                }
            }
            Message::CancelIngest => {
                if let Some(ingest) = &self.ingest {
                    ingest.cancel.cancel();
                    self.status = "Cancelling import...".to_string();
                }
                Task::none()
            }
            Message::ThumbnailReady(name, thumbnail) => {
                // Ignore thumbnails for entries replaced in the meantime
                if self.library.get(&name).is_some() {
                    let handle = thumbnail.map(|t| ImageHandle::from_rgba(t.width, t.height, t.pixels));
                    self.thumbnails.insert(name, handle);
                }
                Task::none()
            }
            Message::DismissWarning => {
                self.warning = None;
                Task::none()
            }
            Message::OpenViewer(name) => self.open_viewer(name),
            Message::ViewerLoaded(outcome) => match self.viewer.complete(outcome) {
                Ok(_) => {
                    self.last_tick = None;
                    self.refresh_frame();
                    Task::none()
                }
                Err(ViewerError::StaleLoad(id)) => {
                    tracing::debug!("Ignoring load signal from {id}");
                    Task::none()
                }
                Err(e) => self.abandon_viewer(e),
            },
            Message::Back => self.close_viewer(),
            Message::Tick(now) => {
                if self.viewer.phase() == Phase::Ready {
                    let elapsed = self.last_tick.map_or(TICK, |last| now.saturating_duration_since(last));
                    self.camera.advance(elapsed.as_secs_f32(), self.viewer.config().auto_rotate_speed);
                    self.last_tick = Some(now);
                    self.refresh_frame();
                }
                Task::none()
            }
            Message::Drag(delta) => {
                self.camera.drag(delta.x, delta.y);
                self.refresh_frame();
                Task::none()
            }
            Message::Zoom(steps) => {
                self.camera.zoom(steps);
                self.refresh_frame();
                Task::none()
            }
            Message::ToggleAutoRotate(enabled) => {
                self.config.viewer.auto_rotate = enabled;
                self.viewer.set_config(self.config.viewer);
                self.last_tick = None;

                if let Err(e) = self.store.lock().save_config(&self.config) {
                    tracing::warn!("⚠️  Could not save settings: {e}");
                }
                Task::none()
            }
            Message::ToggleFullscreen => self.set_fullscreen(!self.fullscreen),
            Message::WindowResized(size) => {
                self.window_size = size;
                self.refresh_frame();
                Task::none()
            }
        }
    }

    /// Start an ingestion run over files already read into memory
    fn start_ingest(&mut self, files: Vec<RawFile>) -> Task<Message> {
        if self.ingest.is_some() {
            return Task::none();
        }
        if files.is_empty() {
            self.status = "No files to import.".to_string();
            return Task::none();
        }

        let total = files.iter().filter(|file| file.is_image()).count();
        let cancel = CancelToken::new();
        let pipeline = IngestPipeline::new(
            Classifier::new(&self.config.classifier),
            self.library.handles().clone(),
            self.store.clone(),
        );

        self.status = format!("Importing {total} images...");
        self.ingest = Some(IngestProgress {
            considered: 0,
            total,
            cancel: cancel.clone(),
        });

        let (progress, updates) = mpsc::unbounded();
        Task::batch([
            Task::run(updates, Message::IngestProgress),
            Task::perform(run_ingest(pipeline, files, progress, cancel), Message::IngestFinished),
        ])
    }

    fn finish_ingest(&mut self, report: IngestReport) -> Task<Message> {
        self.status = format!(
            "✅ Import complete! {} panoramas added, {} not panoramic, {} unreadable.",
            report.accepted(),
            report.rejected,
            report.failed
        );
        if let Some(warning) = report.persist_warning {
            self.warning = Some(warning);
        }

        self.library.adopt(report.entries);
        self.thumbnails.clear();
        self.load_thumbnails()
    }

    /// Generate a thumbnail for every library entry in the background
    fn load_thumbnails(&self) -> Task<Message> {
        Task::batch(self.library.entries().iter().map(|entry| {
            let name = entry.name().to_string();
            Task::perform(generate_thumbnail(entry.asset().data.clone()), move |result| {
                let thumbnail = result
                    .map_err(|e| tracing::warn!("⚠️  No thumbnail for {name}: {e}"))
                    .ok();
                Message::ThumbnailReady(name.clone(), thumbnail)
            })
        }))
    }

    fn open_viewer(&mut self, name: String) -> Task<Message> {
        if self.ingest.is_some() {
            return Task::none();
        }
        let Some(handle) = self.library.get(&name).map(|entry| entry.handle()) else {
            return Task::none();
        };

        self.camera = Camera::from_config(self.viewer.config());
        self.frame = None;
        self.screen = Screen::Viewer;

        match self.viewer.begin_open(&name, handle) {
            Ok(pending) => Task::perform(pending.wait(), Message::ViewerLoaded),
            Err(e) => self.abandon_viewer(e),
        }
    }

    /// The renderer could not load the selection: drop it and return to the grid
    fn abandon_viewer(&mut self, error: ViewerError) -> Task<Message> {
        tracing::warn!("⚠️  {error}");
        self.status = format!("⚠️  {error}");
        self.close_viewer()
    }

    fn close_viewer(&mut self) -> Task<Message> {
        self.viewer.close();
        self.frame = None;
        self.screen = Screen::Grid;

        if self.fullscreen {
            self.set_fullscreen(false)
        } else {
            Task::none()
        }
    }

    fn set_fullscreen(&mut self, fullscreen: bool) -> Task<Message> {
        self.fullscreen = fullscreen;
        let mode = if fullscreen {
            window::Mode::Fullscreen
        } else {
            window::Mode::Windowed
        };
        window::get_latest().and_then(move |id| window::change_mode(id, mode))
    }

    /// Size of the projected view in pixels
    fn render_size(&self) -> (u32, u32) {
        let width = (self.window_size.width * RENDER_SCALE).max(1.0);
        let height = ((self.window_size.height - CONTROLS_HEIGHT) * RENDER_SCALE).max(1.0);
        (width as u32, height as u32)
    }

    /// Re-project the current view after the camera or the window changed
    fn refresh_frame(&mut self) {
        let (width, height) = self.render_size();
        self.frame = self
            .viewer
            .ready_instance()
            .and_then(|instance| instance.render_view(&self.camera, width, height))
            .map(|view| {
                let (width, height) = view.dimensions();
                ImageHandle::from_rgba(width, height, view.into_raw())
            });
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        match self.screen {
            Screen::Viewer => ui::viewer::viewer_view(ViewerScreen {
                asset_name: self.viewer.current_asset(),
                phase: self.viewer.phase(),
                frame: self.frame.as_ref(),
                config: self.viewer.config(),
                fullscreen: self.fullscreen,
            }),
            Screen::Grid => self.grid_screen(),
        }
    }

    fn grid_screen(&self) -> Element<Message> {
        let idle = self.ingest.is_none();

        let actions = row![
            button("Select Files")
                .on_press_maybe(idle.then_some(Message::SelectFiles))
                .padding(10),
            button("Import Folder")
                .on_press_maybe(idle.then_some(Message::ImportFolder))
                .padding(10),
            text(&self.status).size(16),
        ]
        .spacing(12)
        .align_y(Alignment::Center);

        let mut content: Column<Message> = column![text("Panorama Viewer").size(32), actions]
            .spacing(16)
            .padding(20);

        if let Some(warning) = &self.warning {
            content = content.push(
                row![
                    text(format!("⚠️  {warning}")).size(14),
                    button("Dismiss").on_press(Message::DismissWarning).padding(6),
                ]
                .spacing(12)
                .align_y(Alignment::Center),
            );
        }

        if let Some(ingest) = &self.ingest {
            content = content.push(
                row![
                    progress_bar(0.0..=ingest.total.max(1) as f32, ingest.considered as f32).height(12),
                    text(format!("{} / {}", ingest.considered, ingest.total)).size(14),
                    button("Cancel").on_press(Message::CancelIngest).padding(6),
                ]
                .spacing(12)
                .align_y(Alignment::Center),
            );
        }

        content
            .push(ui::grid::grid_view(&self.library, &self.thumbnails, idle))
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn subscription(&self) -> Subscription<Message> {
        let resized = window::resize_events().map(|(_id, size)| Message::WindowResized(size));

        if self.viewer.phase() == Phase::Ready && self.viewer.config().auto_rotate {
            Subscription::batch([resized, iced::time::every(TICK).map(Message::Tick)])
        } else {
            resized
        }
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Run one ingestion, forwarding progress to the UI
async fn run_ingest(
    pipeline: IngestPipeline,
    files: Vec<RawFile>,
    progress: mpsc::UnboundedSender<usize>,
    cancel: CancelToken,
) -> Result<IngestReport, IngestError> {
    pipeline
        .ingest(
            files,
            |considered| {
                // The receiver only goes away when the app is shutting down
                let _ = progress.unbounded_send(considered);
            },
            &cancel,
        )
        .await
}

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    iced::application("Panorama Viewer", PanoramaApp::update, PanoramaApp::view)
        .theme(PanoramaApp::theme)
        .subscription(PanoramaApp::subscription)
        .window_size(INITIAL_WINDOW)
        .centered()
        .run_with(PanoramaApp::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::testing::{file_with, png_file};
    use crate::state::data::Asset;
    use crate::state::store::MemoryStore;

    fn app_with(assets: &[Asset]) -> PanoramaApp {
        let mut memory = MemoryStore::new();
        store::AssetStore::put_all(&mut memory, assets).unwrap();
        let (app, _thumbnails) = PanoramaApp::with_store(store::shared(memory), None);
        app
    }

    fn broken_asset() -> Asset {
        Asset::from(file_with("broken.jpg", "image/jpeg", b"not an image"))
    }

    #[test]
    fn test_unresolved_selection_returns_to_grid() {
        let mut app = app_with(&[broken_asset()]);
        let handle = app.library.get("broken.jpg").unwrap().handle();
        app.library.handles().revoke(&handle);

        let _ = app.update(Message::OpenViewer("broken.jpg".to_string()));

        assert_eq!(app.screen, Screen::Grid);
        assert_eq!(app.viewer.phase(), Phase::Idle);
        assert!(app.status.contains("broken.jpg"));
    }

    #[tokio::test]
    async fn test_load_error_returns_to_grid() {
        let mut app = app_with(&[broken_asset()]);
        let handle = app.library.get("broken.jpg").unwrap().handle();

        // Same steps as OpenViewer, awaiting the load here instead of in a Task
        app.screen = Screen::Viewer;
        let pending = app.viewer.begin_open("broken.jpg", handle).unwrap();
        let outcome = pending.wait().await;
        assert!(outcome.result.is_err());

        let _ = app.update(Message::ViewerLoaded(outcome));

        assert_eq!(app.screen, Screen::Grid);
        assert_eq!(app.viewer.phase(), Phase::Idle);
        assert!(app.frame.is_none());
        assert!(app.status.contains("broken.jpg"));
    }

    #[tokio::test]
    async fn test_loaded_panorama_renders_a_frame() {
        let mut app = app_with(&[Asset::from(png_file("pano.png", 64, 32))]);
        let handle = app.library.get("pano.png").unwrap().handle();

        app.screen = Screen::Viewer;
        let pending = app.viewer.begin_open("pano.png", handle).unwrap();
        let _ = app.update(Message::ViewerLoaded(pending.wait().await));

        assert_eq!(app.screen, Screen::Viewer);
        assert_eq!(app.viewer.phase(), Phase::Ready);
        assert!(app.frame.is_some());

        let _ = app.update(Message::Back);
        assert_eq!(app.screen, Screen::Grid);
        assert_eq!(app.viewer.phase(), Phase::Idle);
    }
}
