//! Viewer session controller.
//!
//! Owns at most one live renderer instance. States:
//!
//! ```text
//! Idle -> Initializing -> Ready -> (tearing down) -> Idle
//!              |                        ^
//!              +------ load error ------+
//! ```
//!
//! Opening on top of an existing session always finishes tearing the old one
//! down before the renderer is asked to load anything new, so two instances
//! never share the mount point.

use std::fmt;

use super::renderer::{LoadSignal, PanoramaInstance, PanoramaRenderer, RenderError};
use crate::state::config::ViewerConfig;
use crate::state::handles::{HandleAllocator, ViewHandle};

/// Identifies one `open` call. Later sessions always get larger ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session #{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Initializing,
    Ready,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ViewerError {
    /// The renderer could not load the selected asset; the selection is abandoned
    #[error("could not open {asset}: {source}")]
    Init {
        asset: String,
        #[source]
        source: RenderError,
    },
    /// A load outcome arrived for a session that has since been replaced or closed
    #[error("ignoring load result for {0}, which is no longer current")]
    StaleLoad(SessionId),
}

struct Session<I> {
    id: SessionId,
    asset_name: String,
    handle: ViewHandle,
    instance: I,
}

enum State<I> {
    Idle,
    Initializing(Session<I>),
    Ready(Session<I>),
}

/// An `open` that is waiting for the renderer's ready/error signal.
///
/// Owns nothing but the signal, so it can be awaited without borrowing the
/// controller. Feed the outcome back with [`ViewerController::complete`].
pub struct PendingOpen {
    id: SessionId,
    signal: LoadSignal,
}

impl PendingOpen {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Suspend until the renderer reports ready or error
    pub async fn wait(self) -> LoadOutcome {
        LoadOutcome {
            id: self.id,
            result: self.signal.await,
        }
    }
}

/// What the renderer reported for one session
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub id: SessionId,
    pub result: Result<(), RenderError>,
}

pub struct ViewerController<R: PanoramaRenderer> {
    renderer: R,
    handles: HandleAllocator,
    config: ViewerConfig,
    mount: String,
    state: State<R::Instance>,
    last_id: u64,
}

impl<R: PanoramaRenderer> ViewerController<R> {
    pub fn new(renderer: R, handles: HandleAllocator, config: ViewerConfig, mount: impl Into<String>) -> Self {
        Self {
            renderer,
            handles,
            config,
            mount: mount.into(),
            state: State::Idle,
            last_id: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::Initializing(_) => Phase::Initializing,
            State::Ready(_) => Phase::Ready,
        }
    }

    /// Name of the asset being shown or loaded
    pub fn current_asset(&self) -> Option<&str> {
        match &self.state {
            State::Idle => None,
            State::Initializing(session) | State::Ready(session) => Some(&session.asset_name),
        }
    }

    pub fn current_handle(&self) -> Option<ViewHandle> {
        match &self.state {
            State::Idle => None,
            State::Initializing(session) | State::Ready(session) => Some(session.handle),
        }
    }

    /// The live instance, only once it has reported ready
    pub fn ready_instance(&self) -> Option<&R::Instance> {
        match &self.state {
            State::Ready(session) => Some(&session.instance),
            _ => None,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Applies to sessions opened from now on
    pub fn set_config(&mut self, config: ViewerConfig) {
        self.config = config;
    }

    /// Open `handle` and wait until the renderer reports ready or error
    pub async fn open(&mut self, asset_name: &str, handle: ViewHandle) -> Result<(), ViewerError> {
        let pending = self.begin_open(asset_name, handle)?;
        let outcome = pending.wait().await;
        self.complete(outcome).map(|_| ())
    }

    /// Tear down any current session, then ask the renderer to start loading.
    ///
    /// Fails immediately (and stays Idle) if the handle no longer resolves or
    /// the renderer refuses to create an instance.
    pub fn begin_open(&mut self, asset_name: &str, handle: ViewHandle) -> Result<PendingOpen, ViewerError> {
        self.close();

        self.last_id += 1;
        let id = SessionId(self.last_id);
        let init_error = |source: RenderError| ViewerError::Init {
            asset: asset_name.to_string(),
            source,
        };

        let source = self
            .handles
            .resolve(&handle)
            .ok_or_else(|| init_error(RenderError::Unresolved(handle.to_string())))?;

        let (instance, signal) = self
            .renderer
            .create(&self.mount, source, &self.config)
            .map_err(init_error)?;

        tracing::info!("🎬 Opening {} ({})", asset_name, id);
        self.state = State::Initializing(Session {
            id,
            asset_name: asset_name.to_string(),
            handle,
            instance,
        });

        Ok(PendingOpen { id, signal })
    }

    /// Apply a renderer outcome.
    ///
    /// Ready is only reachable from here. An error tears the instance down
    /// and returns `ViewerError::Init`. Outcomes for sessions that are no
    /// longer current are ignored with `ViewerError::StaleLoad`.
    pub fn complete(&mut self, outcome: LoadOutcome) -> Result<Phase, ViewerError> {
        let session = match std::mem::replace(&mut self.state, State::Idle) {
            State::Initializing(session) if session.id == outcome.id => session,
            other => {
                self.state = other;
                tracing::debug!("Dropping stale load outcome for {}", outcome.id);
                return Err(ViewerError::StaleLoad(outcome.id));
            }
        };

        match outcome.result {
            Ok(()) => {
                tracing::info!("✅ {} ready ({})", session.asset_name, session.id);
                self.state = State::Ready(session);
                Ok(Phase::Ready)
            }
            Err(source) => {
                tracing::warn!("⚠️  {} failed to load: {}", session.asset_name, source);
                let asset = session.asset_name.clone();
                Self::teardown(session);
                Err(ViewerError::Init { asset, source })
            }
        }
    }

    /// Tear down the current session, if any. Never fails; always ends Idle.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => {}
            State::Initializing(session) | State::Ready(session) => Self::teardown(session),
        }
    }

    fn teardown(mut session: Session<R::Instance>) {
        match session.instance.destroy() {
            Ok(()) => tracing::debug!("🧹 Tore down {} ({})", session.asset_name, session.id),
            Err(e) => tracing::warn!("⚠️  Teardown of {} failed: {}", session.asset_name, e),
        }
    }
}

impl<R: PanoramaRenderer> Drop for ViewerController<R> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<R: PanoramaRenderer> fmt::Debug for ViewerController<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewerController")
            .field("mount", &self.mount)
            .field("phase", &self.phase())
            .field("asset", &self.current_asset())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::Asset;
    use bytes::Bytes;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Load(String),
        Destroy(String),
    }

    /// How the next created instance should report
    enum Script {
        Ready,
        Fail,
        /// Hold the signal until the test fires it
        Hold,
    }

    type Trigger = oneshot::Sender<Result<(), RenderError>>;

    #[derive(Default)]
    struct FakeRenderer {
        log: Arc<Mutex<Vec<Event>>>,
        scripts: VecDeque<Script>,
        held: Arc<Mutex<Vec<Trigger>>>,
        fail_destroy: bool,
        refuse_create: bool,
    }

    struct FakeInstance {
        source: String,
        log: Arc<Mutex<Vec<Event>>>,
        fail_destroy: bool,
    }

    impl PanoramaInstance for FakeInstance {
        fn destroy(&mut self) -> Result<(), RenderError> {
            self.log.lock().push(Event::Destroy(self.source.clone()));
            if self.fail_destroy {
                return Err(RenderError::Teardown("context lost".to_string()));
            }
            Ok(())
        }
    }

    impl PanoramaRenderer for FakeRenderer {
        type Instance = FakeInstance;

        fn create(
            &mut self,
            _mount: &str,
            source: Bytes,
            _config: &ViewerConfig,
        ) -> Result<(FakeInstance, LoadSignal), RenderError> {
            if self.refuse_create {
                return Err(RenderError::Load("no context".to_string()));
            }
            let source = String::from_utf8_lossy(&source).to_string();
            self.log.lock().push(Event::Load(source.clone()));

            let signal: LoadSignal = match self.scripts.pop_front().unwrap_or(Script::Ready) {
                Script::Ready => Box::pin(async { Ok(()) }),
                Script::Fail => Box::pin(async { Err(RenderError::Load("corrupt".to_string())) }),
                Script::Hold => {
                    let (tx, rx) = oneshot::channel();
                    self.held.lock().push(tx);
                    Box::pin(async move { rx.await.unwrap_or(Err(RenderError::SignalLost)) })
                }
            };

            let instance = FakeInstance {
                source,
                log: self.log.clone(),
                fail_destroy: self.fail_destroy,
            };
            Ok((instance, signal))
        }
    }

    struct Fixture {
        handles: HandleAllocator,
        log: Arc<Mutex<Vec<Event>>>,
        held: Arc<Mutex<Vec<Trigger>>>,
    }

    impl Fixture {
        fn handle(&self, name: &str) -> ViewHandle {
            self.handles.allocate(&Asset {
                name: name.to_string(),
                size: name.len() as u64,
                last_modified: Utc::now(),
                mime_type: "image/jpeg".to_string(),
                data: Bytes::from(name.as_bytes().to_vec()),
            })
        }

        fn events(&self) -> Vec<Event> {
            self.log.lock().clone()
        }
    }

    fn controller(renderer: FakeRenderer) -> (ViewerController<FakeRenderer>, Fixture) {
        let handles = HandleAllocator::new();
        let fixture = Fixture {
            handles: handles.clone(),
            log: renderer.log.clone(),
            held: renderer.held.clone(),
        };
        let controller = ViewerController::new(renderer, handles, ViewerConfig::default(), "viewer");
        (controller, fixture)
    }

    fn load(name: &str) -> Event {
        Event::Load(name.to_string())
    }

    fn destroy(name: &str) -> Event {
        Event::Destroy(name.to_string())
    }

    #[tokio::test]
    async fn test_open_reaches_ready() {
        let (mut viewer, fx) = controller(FakeRenderer::default());
        assert_eq!(viewer.phase(), Phase::Idle);

        viewer.open("a.jpg", fx.handle("a.jpg")).await.unwrap();

        assert_eq!(viewer.phase(), Phase::Ready);
        assert_eq!(viewer.current_asset(), Some("a.jpg"));
        assert!(viewer.ready_instance().is_some());
        assert_eq!(fx.events(), vec![load("a.jpg")]);
    }

    #[tokio::test]
    async fn test_second_open_tears_down_first_before_loading() {
        let (mut viewer, fx) = controller(FakeRenderer::default());

        viewer.open("a.jpg", fx.handle("a.jpg")).await.unwrap();
        viewer.open("b.jpg", fx.handle("b.jpg")).await.unwrap();

        assert_eq!(fx.events(), vec![load("a.jpg"), destroy("a.jpg"), load("b.jpg")]);
        assert_eq!(viewer.phase(), Phase::Ready);
        assert_eq!(viewer.current_asset(), Some("b.jpg"));
    }

    #[tokio::test]
    async fn test_open_while_initializing_ignores_old_outcome() {
        let renderer = FakeRenderer {
            scripts: VecDeque::from([Script::Hold, Script::Hold]),
            ..FakeRenderer::default()
        };
        let (mut viewer, fx) = controller(renderer);

        let first = viewer.begin_open("a.jpg", fx.handle("a.jpg")).unwrap();
        let second = viewer.begin_open("b.jpg", fx.handle("b.jpg")).unwrap();
        assert_eq!(fx.events(), vec![load("a.jpg"), destroy("a.jpg"), load("b.jpg")]);
        assert!(first.id() < second.id());

        // The first renderer fires late; it must not touch the new session
        let triggers: Vec<Trigger> = fx.held.lock().drain(..).collect();
        for trigger in triggers {
            trigger.send(Ok(())).unwrap();
        }
        let stale = first.wait().await;
        assert!(matches!(viewer.complete(stale), Err(ViewerError::StaleLoad(_))));
        assert_eq!(viewer.phase(), Phase::Initializing);
        assert_eq!(viewer.current_asset(), Some("b.jpg"));

        let fresh = second.wait().await;
        assert_eq!(viewer.complete(fresh).unwrap(), Phase::Ready);
        assert_eq!(viewer.current_asset(), Some("b.jpg"));
    }

    #[tokio::test]
    async fn test_load_error_returns_to_idle() {
        let renderer = FakeRenderer {
            scripts: VecDeque::from([Script::Fail]),
            ..FakeRenderer::default()
        };
        let (mut viewer, fx) = controller(renderer);

        let result = viewer.open("broken.jpg", fx.handle("broken.jpg")).await;

        match result {
            Err(ViewerError::Init { asset, source }) => {
                assert_eq!(asset, "broken.jpg");
                assert_eq!(source, RenderError::Load("corrupt".to_string()));
            }
            other => panic!("expected init error, got {other:?}"),
        }
        assert_eq!(viewer.phase(), Phase::Idle);
        assert!(viewer.current_asset().is_none());
        assert!(viewer.ready_instance().is_none());
        assert_eq!(fx.events(), vec![load("broken.jpg"), destroy("broken.jpg")]);
    }

    #[tokio::test]
    async fn test_revoked_handle_cannot_be_opened() {
        let (mut viewer, fx) = controller(FakeRenderer::default());
        let handle = fx.handle("a.jpg");
        fx.handles.revoke(&handle);

        let result = viewer.open("a.jpg", handle).await;

        assert!(matches!(
            result,
            Err(ViewerError::Init { source: RenderError::Unresolved(_), .. })
        ));
        assert_eq!(viewer.phase(), Phase::Idle);
        assert!(fx.events().is_empty());
    }

    #[tokio::test]
    async fn test_create_refusal_is_init_error() {
        let renderer = FakeRenderer {
            refuse_create: true,
            ..FakeRenderer::default()
        };
        let (mut viewer, fx) = controller(renderer);

        let result = viewer.open("a.jpg", fx.handle("a.jpg")).await;
        assert!(matches!(result, Err(ViewerError::Init { .. })));
        assert_eq!(viewer.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut viewer, fx) = controller(FakeRenderer::default());
        viewer.close();

        viewer.open("a.jpg", fx.handle("a.jpg")).await.unwrap();
        viewer.close();
        viewer.close();

        assert_eq!(viewer.phase(), Phase::Idle);
        assert_eq!(fx.events(), vec![load("a.jpg"), destroy("a.jpg")]);
    }

    #[tokio::test]
    async fn test_teardown_failure_is_swallowed() {
        let renderer = FakeRenderer {
            fail_destroy: true,
            ..FakeRenderer::default()
        };
        let (mut viewer, fx) = controller(renderer);

        viewer.open("a.jpg", fx.handle("a.jpg")).await.unwrap();
        viewer.close();
        assert_eq!(viewer.phase(), Phase::Idle);

        // A failed teardown does not block the next session either
        viewer.open("b.jpg", fx.handle("b.jpg")).await.unwrap();
        assert_eq!(viewer.phase(), Phase::Ready);
    }

    #[tokio::test]
    async fn test_outcome_after_close_is_stale() {
        let renderer = FakeRenderer {
            scripts: VecDeque::from([Script::Hold]),
            ..FakeRenderer::default()
        };
        let (mut viewer, fx) = controller(renderer);

        let pending = viewer.begin_open("a.jpg", fx.handle("a.jpg")).unwrap();
        viewer.close();
        // Dropping the trigger resolves the signal as lost
        fx.held.lock().clear();

        let outcome = pending.wait().await;
        assert_eq!(outcome.result, Err(RenderError::SignalLost));
        assert!(matches!(viewer.complete(outcome), Err(ViewerError::StaleLoad(_))));
        assert_eq!(viewer.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_drop_tears_down_live_session() {
        let (mut viewer, fx) = controller(FakeRenderer::default());
        viewer.open("a.jpg", fx.handle("a.jpg")).await.unwrap();
        drop(viewer);
        assert_eq!(fx.events(), vec![load("a.jpg"), destroy("a.jpg")]);
    }
}
