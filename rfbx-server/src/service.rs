//! RFB service: listener, handshake, per-client wiring.
//!
//! One [`LocalUpdateHandler`] owns the screen; detector tasks deposit
//! changes into its keeper. Each viewer gets an [`UpdateSender`] whose
//! worker writes frames on its own TCP stream. Extraction fans a
//! single snapshot out to every sender, so no viewer misses a change.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rfbx_core::update::{
    CursorShapeGrabber, DetectorSet, LocalUpdateHandler, NoCopyRectDetector, ScreenDriverFactory,
    UpdateContainer, UpdateListener, VideoRegionTracker,
};
use rfbx_core::{ClientMsgCodec, CursorShape, Region, RfbError, UpdateSender};

use crate::config::ServerConfig;
use crate::source::{self, OrbitingCursor, StaticCursorShape, TestPatternSource};

// ── Shared state ─────────────────────────────────────────────────

struct Shared {
    handler: Mutex<LocalUpdateHandler>,
    clients: Mutex<Vec<Arc<UpdateSender>>>,
}

impl Shared {
    /// Extract pending changes and fan them out, if any client has an
    /// outstanding request that intersects them.
    fn pump(&self) {
        let clients = self.clients.lock().expect("client list lock poisoned");
        let mut interest = Region::new();
        for sender in clients.iter().filter(|s| s.client_is_ready()) {
            interest.add(&sender.requested_region());
        }
        if interest.is_empty() {
            return;
        }

        let mut handler = self.handler.lock().expect("handler lock poisoned");
        if !handler.check_for_updates(&interest) {
            return;
        }
        let mut container = UpdateContainer::new();
        if let Err(e) = handler.extract(&mut container) {
            warn!(error = %e, "update extraction failed");
            return;
        }
        if container.is_empty() {
            return;
        }
        for sender in clients.iter() {
            if let Err(e) =
                sender.new_updates(&container, handler.screen_buffer(), handler.cursor_shape())
            {
                warn!(error = %e, "client sync failed");
            }
        }
    }
}

/// Detector callback: every deposit triggers a pump.
struct PumpListener {
    shared: Arc<Shared>,
}

impl UpdateListener for PumpListener {
    fn on_update(&self) {
        self.shared.pump();
    }
}

/// Shape grabber returning the built-in cursor image.
struct FixedShapeGrabber;

impl CursorShapeGrabber for FixedShapeGrabber {
    fn grab_shape(&mut self) -> Result<CursorShape, RfbError> {
        Ok(source::default_cursor_shape())
    }
}

// ── RfbService ───────────────────────────────────────────────────

/// The top-level server: binds the listener, owns the pipeline, and
/// accepts viewers until cancelled.
pub struct RfbService {
    config: ServerConfig,
    cancel: CancellationToken,
}

impl RfbService {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the service when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until the cancel token fires.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let screen = &self.config.screen;
        let source = TestPatternSource::new(screen.width, screen.height);
        let driver = ScreenDriverFactory::new(screen.prefer_mirror).create(Box::new(source))?;
        let dim = driver.screen_dimension();

        let handler = LocalUpdateHandler::new(
            driver,
            Box::new(NoCopyRectDetector),
            VideoRegionTracker::new(None, Duration::from_millis(screen.video_interval_ms)),
            Some(Box::new(FixedShapeGrabber)),
        );
        let keeper = handler.keeper();

        let shared = Arc::new(Shared {
            handler: Mutex::new(handler),
            clients: Mutex::new(Vec::new()),
        });

        let listener_cb: Arc<dyn UpdateListener> = Arc::new(PumpListener {
            shared: Arc::clone(&shared),
        });
        let mut detectors = DetectorSet::new(keeper, listener_cb);
        detectors.spawn_poller(Duration::from_millis(screen.poll_interval_ms));
        detectors.spawn_mouse_detector(
            Box::new(OrbitingCursor::new(dim)),
            Duration::from_millis(screen.mouse_interval_ms),
        );
        detectors.spawn_shape_detector(
            Box::new(StaticCursorShape),
            Duration::from_millis(screen.shape_interval_ms),
        );

        let bind = format!(
            "{}:{}",
            self.config.network.bind_address, self.config.network.port
        );
        let tcp = TcpListener::bind(&bind).await?;
        info!("listening on {bind}");

        loop {
            let accept = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = tcp.accept() => result,
            };
            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };

            let connected = shared.clients.lock().expect("client list lock poisoned").len();
            if connected >= self.config.network.max_clients {
                warn!("refusing {peer}: client limit reached");
                continue;
            }

            info!("viewer connected from {peer}");
            let shared = Arc::clone(&shared);
            let cancel = self.cancel.child_token();
            tokio::spawn(async move {
                if let Err(e) = serve_client(shared, stream, cancel).await {
                    debug!(error = %e, "session with {peer} ended with error");
                }
                info!("viewer {peer} disconnected");
            });
        }

        detectors.shutdown().await;
        info!("server stopped");
        Ok(())
    }
}

// ── Per-client session ───────────────────────────────────────────

async fn serve_client(
    shared: Arc<Shared>,
    mut stream: TcpStream,
    cancel: CancellationToken,
) -> Result<(), RfbError> {
    let (dim, format) = {
        let handler = shared.handler.lock().expect("handler lock poisoned");
        let fb = handler.screen_buffer();
        (fb.dimension(), fb.format())
    };

    handshake(&mut stream, dim.width as u16, dim.height as u16, &format).await?;

    let sender = UpdateSender::new(dim, format);
    shared
        .clients
        .lock()
        .expect("client list lock poisoned")
        .push(Arc::clone(&sender));

    // The newcomer's framebuffer copy is blank; force a full repaint
    // past the change filter so its first frame has real pixels.
    {
        let mut handler = shared.handler.lock().expect("handler lock poisoned");
        handler.set_full_update_requested();
        handler
            .keeper()
            .lock()
            .expect("keeper lock poisoned")
            .mark_whole_screen_changed();
    }

    let (read_half, write_half) = stream.into_split();
    let writer = tokio::spawn(Arc::clone(&sender).run(write_half, cancel.clone()));

    let mut framed = FramedRead::new(read_half, ClientMsgCodec);
    while let Some(message) = tokio::select! {
        _ = cancel.cancelled() => None,
        msg = framed.next() => msg,
    } {
        match message {
            Ok(msg) => {
                sender.on_client_message(msg);
                shared.pump();
            }
            Err(e) => {
                warn!(error = %e, "dropping client after protocol error");
                break;
            }
        }
    }

    cancel.cancel();
    let _ = writer.await;

    let mut clients = shared.clients.lock().expect("client list lock poisoned");
    clients.retain(|s| !Arc::ptr_eq(s, &sender));
    Ok(())
}

// ── Handshake ────────────────────────────────────────────────────

const PROTOCOL_VERSION: &[u8; 12] = b"RFB 003.008\n";
const SECURITY_NONE: u8 = 1;

/// Minimal RFB 3.8 greeting: version exchange, security "None",
/// ClientInit / ServerInit.
async fn handshake(
    stream: &mut TcpStream,
    width: u16,
    height: u16,
    format: &rfbx_core::PixelFormat,
) -> Result<(), RfbError> {
    stream.write_all(PROTOCOL_VERSION).await?;
    let mut version = [0u8; 12];
    stream.read_exact(&mut version).await?;
    if &version[..4] != b"RFB " {
        return Err(RfbError::ProtocolViolation("bad version string"));
    }

    // One security type on offer.
    stream.write_all(&[1, SECURITY_NONE]).await?;
    let mut chosen = [0u8; 1];
    stream.read_exact(&mut chosen).await?;
    if chosen[0] != SECURITY_NONE {
        return Err(RfbError::ProtocolViolation("unsupported security type"));
    }
    stream.write_all(&0u32.to_be_bytes()).await?;

    // ClientInit: shared flag, ignored (all sessions are shared).
    let mut shared_flag = [0u8; 1];
    stream.read_exact(&mut shared_flag).await?;

    let mut init = Vec::with_capacity(24 + SERVER_NAME.len());
    init.extend_from_slice(&width.to_be_bytes());
    init.extend_from_slice(&height.to_be_bytes());
    init.extend_from_slice(&encode_pixel_format(format));
    init.extend_from_slice(&(SERVER_NAME.len() as u32).to_be_bytes());
    init.extend_from_slice(SERVER_NAME.as_bytes());
    stream.write_all(&init).await?;
    stream.flush().await?;
    Ok(())
}

const SERVER_NAME: &str = "rfbx";

/// Wire layout of a pixel format: 16 bytes, big-endian fields, three
/// bytes of trailing padding.
fn encode_pixel_format(f: &rfbx_core::PixelFormat) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0] = f.bits_per_pixel;
    out[1] = f.depth;
    out[2] = f.big_endian as u8;
    out[3] = 1; // true color
    out[4..6].copy_from_slice(&f.red_max.to_be_bytes());
    out[6..8].copy_from_slice(&f.green_max.to_be_bytes());
    out[8..10].copy_from_slice(&f.blue_max.to_be_bytes());
    out[10] = f.red_shift;
    out[11] = f.green_shift;
    out[12] = f.blue_shift;
    out
}
