//! The per-client update protocol engine.
//!
//! Each connected client owns one `UpdateSender`. Inbound messages
//! mutate its state; the shared update handler fans extracted snapshots
//! into its private keeper via [`UpdateSender::new_updates`]; and a
//! worker task assembles `FramebufferUpdate` frames whenever there is
//! both an outstanding request and something to send.
//!
//! The no-loss rule shapes everything here: pending changes and
//! outstanding requests are only ever moved, never dropped. Changes
//! outside the requested area go back into the keeper; requests that
//! find nothing to send are restored so the next snapshot can answer
//! them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::RfbError;
use crate::pixel::{CursorShape, FrameBuffer, PixelConverter, PixelFormat};
use crate::proto::msg;
use crate::proto::{CapabilityRegistry, ClientMessage};
use crate::region::{Dimension, Point, Rect, Region};
use crate::sender::cursor::CursorUpdates;
use crate::sender::encoder::EncoderStore;
use crate::sender::options::EncodeOptions;
use crate::update::{UpdateContainer, UpdateKeeper};

// ── Frame plan ───────────────────────────────────────────────────

/// What one assembled frame will carry, before serialization.
struct FramePlan {
    desktop_size: Option<Dimension>,
    /// Full repaint source for clients without desktop-size support:
    /// the screen overlaid on a blank buffer of the announced size.
    blank_frame: Option<FrameBuffer>,
    copy_rects: Vec<Rect>,
    copy_src: Point,
    video_rects: Vec<Rect>,
    changed_rects: Vec<Rect>,
    cursor_pos: Option<Point>,
    cursor_shape: bool,
}

impl FramePlan {
    fn rect_count(&self) -> usize {
        self.desktop_size.is_some() as usize
            + self.copy_rects.len()
            + self.video_rects.len()
            + self.changed_rects.len()
            + self.cursor_pos.is_some() as usize
            + self.cursor_shape as usize
    }

    fn is_empty(&self) -> bool {
        self.rect_count() == 0
    }
}

// ── Sender state ─────────────────────────────────────────────────

/// Everything the frame assembler reads and writes, kept behind one
/// lock so message handling and update fan-out stay consistent.
struct SenderState {
    requested_incremental: Region,
    requested_full: Region,
    keeper: UpdateKeeper,
    fb: FrameBuffer,
    cursor_shape: CursorShape,
    cursor: CursorUpdates,
    options: EncodeOptions,
    /// Geometry the client believes the framebuffer has.
    client_dim: Dimension,
    converter: PixelConverter,
    client_format: PixelFormat,
    pending_format: Option<(PixelFormat, bool)>,
    color_map: bool,
    palette_sent: bool,
    video_frozen: bool,
    viewport: Rect,
    /// When the oldest unanswered request arrived, for latency logging.
    request_at: Option<Instant>,
}

// ── UpdateSender ─────────────────────────────────────────────────

static NEXT_SENDER_ID: AtomicU64 = AtomicU64::new(1);

pub struct UpdateSender {
    id: u64,
    state: Mutex<SenderState>,
    registry: CapabilityRegistry,
    notify: Notify,
}

impl UpdateSender {
    /// Build a sender for a freshly handshaken client. `viewport_dim`
    /// and `format` are the values announced in the server init.
    pub fn new(viewport_dim: Dimension, format: PixelFormat) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SENDER_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(SenderState {
                requested_incremental: Region::new(),
                requested_full: Region::new(),
                keeper: UpdateKeeper::new(viewport_dim.rect()),
                fb: FrameBuffer::new(viewport_dim, format),
                cursor_shape: CursorShape::default(),
                cursor: CursorUpdates::new(),
                options: EncodeOptions::default(),
                client_dim: viewport_dim,
                converter: PixelConverter::new(format, format),
                client_format: format,
                pending_format: None,
                color_map: false,
                palette_sent: false,
                video_frozen: false,
                viewport: viewport_dim.rect(),
                request_at: None,
            }),
            registry: default_registry(),
            notify: Notify::new(),
        })
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Handle one decoded client message.
    pub fn on_client_message(&self, message: ClientMessage) {
        let mut state = self.state.lock().expect("sender lock poisoned");
        match message {
            ClientMessage::SetPixelFormat { format, color_map } => {
                // Applied at the top of the next frame; mid-frame format
                // switches would corrupt the stream.
                state.pending_format = Some((format, color_map));
            }
            ClientMessage::SetEncodings { codes } => {
                let had_copy_rect = state.options.copy_rect_enabled();
                state.options = EncodeOptions::from_codes(&codes, &self.registry);
                debug!(
                    client = self.id,
                    enabled = ?self.registry.enabled(&codes),
                    "encodings negotiated"
                );
                if let Some(level) = state.options.compression_level() {
                    // Applied lazily; the store lives with the worker.
                    trace!(client = self.id, level, "client compression level");
                }
                if had_copy_rect && !state.options.copy_rect_enabled() {
                    // Any pending copy can no longer be expressed.
                    let mut stale = UpdateContainer::new();
                    state.keeper.extract(&mut stale);
                    let copied = std::mem::take(&mut stale.copied_region);
                    stale.changed_region.add(&copied);
                    state.keeper.add_update_container(&stale);
                }
            }
            ClientMessage::UpdateRequest { incremental, rect } => {
                if state.request_at.is_none() {
                    state.request_at = Some(Instant::now());
                }
                if incremental {
                    state.requested_incremental.add_rect(&rect);
                } else {
                    state.requested_full.add_rect(&rect);
                }
            }
            ClientMessage::VideoFreeze { frozen } => {
                // Vendor message; honored only when registered.
                let registered = self
                    .registry
                    .client_messages()
                    .iter()
                    .any(|c| c.code == i32::from(msg::CLI_VIDEO_FREEZE));
                if registered {
                    state.video_frozen = frozen;
                }
            }
        }
        drop(state);
        self.notify.notify_one();
    }

    /// Fan a freshly extracted snapshot into this client's keeper and
    /// sync the reported pixels into the sender's framebuffer copy.
    pub fn new_updates(
        &self,
        container: &UpdateContainer,
        screen: &FrameBuffer,
        cursor_shape: &CursorShape,
    ) -> Result<(), RfbError> {
        let mut state = self.state.lock().expect("sender lock poisoned");

        if !state.fb.same_properties(screen) {
            state.fb.clone_from_fb(screen);
        } else {
            let mut reported = container.changed_region.clone();
            reported.add(&container.copied_region);
            reported.add(&container.video_region);
            for rect in reported.rects() {
                state.fb.copy_rect_from(rect, screen, rect.left, rect.top)?;
            }
        }

        if container.cursor_shape_changed {
            state.cursor_shape.clone_from_shape(cursor_shape);
        }
        state.keeper.add_update_container(container);

        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    /// True when the client has an outstanding update request.
    pub fn client_is_ready(&self) -> bool {
        let state = self.state.lock().expect("sender lock poisoned");
        !state.requested_incremental.is_empty() || !state.requested_full.is_empty()
    }

    /// The area the client currently cares about (for pre-flight
    /// update checks).
    pub fn requested_region(&self) -> Region {
        let state = self.state.lock().expect("sender lock poisoned");
        let mut req = state.requested_incremental.clone();
        req.add(&state.requested_full);
        req
    }

    /// Worker loop: assemble and write frames until cancelled.
    pub async fn run<W>(
        self: Arc<Self>,
        mut writer: W,
        cancel: CancellationToken,
    ) -> Result<(), RfbError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut encoders = EncoderStore::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = self.notify.notified() => {}
            }
            while let Some(frame) = self.prepare_frame(&mut encoders)? {
                writer.write_all(&frame).await?;
                writer.flush().await?;
            }
        }
    }

    // ── Frame assembly ───────────────────────────────────────────

    /// Assemble the next frame, or `None` when the client is not ready
    /// or nothing intersects its request.
    pub fn prepare_frame(&self, encoders: &mut EncoderStore) -> Result<Option<BytesMut>, RfbError> {
        let mut state = self.state.lock().expect("sender lock poisoned");
        let state = &mut *state;

        // Drain the outstanding requests.
        let incremental = std::mem::take(&mut state.requested_incremental);
        let full = std::mem::take(&mut state.requested_full);
        if incremental.is_empty() && full.is_empty() {
            return Ok(None);
        }
        let mut requested = incremental.clone();
        requested.add(&full);

        let mut palette = None;
        if let Some((format, color_map)) = state.pending_format.take() {
            state.client_format = format;
            state.color_map = color_map;
            state.palette_sent = false;
        }
        if state.color_map && !state.palette_sent {
            palette = Some(encode_color_map(&state.client_format));
            state.palette_sent = true;
        }
        // A compression level applies directly; a quality-only client
        // gets its preference mapped onto compression effort instead.
        let level = state
            .options
            .compression_level()
            .or_else(|| state.options.quality_level().map(|q| 9 - q));
        if let Some(level) = level {
            encoders.video_mut().set_compression_level(level);
        }

        let mut container = UpdateContainer::new();
        state.keeper.extract(&mut container);

        // The effective viewport is the overlap of the geometry the
        // client declared and the actual framebuffer. When it moves,
        // pending copies die and the new viewport is repainted whole.
        let viewport = state.client_dim.rect().intersection(&state.fb.dimension().rect());
        if viewport != state.viewport {
            state.viewport = viewport;
            container.changed_region.add_rect(&viewport);
            container.copied_region.clear();
        }

        // A non-incremental request is an order to resend that area
        // whether or not it changed.
        container.changed_region.add(&full);

        let plan = build_plan(state, &mut container, &requested, !full.is_empty())?;

        if plan.is_empty() {
            // Nothing to answer with. Put both sides back and wait for
            // the next snapshot.
            state.keeper.add_update_container(&container);
            state.requested_incremental.add(&incremental);
            state.requested_full.add(&full);
            return Ok(Some(match palette {
                Some(buf) => buf,
                None => return Ok(None),
            }));
        }

        // Anything that fell outside the request stays pending.
        state.keeper.add_update_container(&container);

        let frame = serialize_frame(state, &plan, palette, encoders)?;
        let latency_us = state
            .request_at
            .take()
            .map(|at| at.elapsed().as_micros() as u64)
            .unwrap_or(0);
        debug!(
            client = self.id,
            rects = plan.rect_count(),
            bytes = frame.len(),
            latency_us,
            "framebuffer update assembled"
        );
        Ok(Some(frame))
    }
}

// ── Plan construction ────────────────────────────────────────────

/// Reconcile the extracted snapshot with the requested region into a
/// concrete frame plan. Consumed parts are removed from `container`;
/// whatever remains in it is the caller's to re-insert.
fn build_plan(
    state: &mut SenderState,
    container: &mut UpdateContainer,
    requested: &Region,
    full_requested: bool,
) -> Result<FramePlan, RfbError> {
    let mut plan = FramePlan {
        desktop_size: None,
        blank_frame: None,
        copy_rects: Vec::new(),
        copy_src: container.copy_src,
        video_rects: Vec::new(),
        changed_rects: Vec::new(),
        cursor_pos: None,
        cursor_shape: false,
    };

    // A size change, or a full request from a client that cannot be
    // told about size changes, preempts everything else in the frame.
    let legacy_full = full_requested && !state.options.desktop_size_enabled();
    if container.screen_size_changed || legacy_full {
        container.screen_size_changed = false;
        let new_dim = state.fb.dimension();
        if state.options.desktop_size_enabled() {
            // The client resizes and re-requests; everything pending
            // becomes a full repaint for that next request.
            state.client_dim = new_dim;
            state.viewport = new_dim.rect();
            state.keeper.set_border_rect(state.viewport);
            state.keeper.mark_whole_screen_changed();
            container.clear();
            plan.desktop_size = Some(new_dim);
            return Ok(plan);
        }
        // The announced geometry cannot change; the client is shown a
        // full frame in that geometry, the screen overlaid on a blank
        // background wherever it no longer covers it.
        let announced = state.client_dim;
        let mut blank = FrameBuffer::new(announced, state.fb.format());
        let overlap = announced.rect().intersection(&new_dim.rect());
        if !overlap.is_empty() {
            blank.copy_rect_from(&overlap, &state.fb, overlap.left, overlap.top)?;
        }
        state.keeper.set_border_rect(state.viewport.intersection(&new_dim.rect()));
        state.keeper.mark_whole_screen_changed();
        container.clear();
        let bpp = state.client_format.bytes_per_pixel();
        let mut split = Vec::new();
        encoder_split(&announced.rect(), bpp, &mut split);
        plan.changed_rects = split;
        plan.blank_frame = Some(blank);
        return Ok(plan);
    }

    // Cursor flags, gated by capability. A full request resends the
    // shape even if it did not change since the last frame.
    state.cursor.update_from(container, &state.options);
    if full_requested {
        state.cursor.request_shape(&state.options);
    }
    container.cursor_pos_changed = false;
    container.cursor_shape_changed = false;
    plan.cursor_pos = state.cursor.take_pos();
    plan.cursor_shape = state.cursor.take_shape();

    // Copy-move: degrade unless the client can take a CopyRect and the
    // whole destination is inside the requested area (a partial copy
    // would need source pixels the client does not have).
    if !container.copied_region.is_empty() {
        let usable = state.options.copy_rect_enabled()
            && requested.contains_rect(&container.copied_region.bounding_rect());
        if usable {
            let mut copied = std::mem::take(&mut container.copied_region);
            copied.crop(&state.viewport);
            plan.copy_rects = copied.rects().to_vec();
        } else {
            let copied = std::mem::take(&mut container.copied_region);
            container.changed_region.add(&copied);
        }
    }

    // Video region: streamed when allowed, otherwise ordinary changes.
    if !container.video_region.is_empty() {
        if state.options.zstd_video_enabled() && !state.video_frozen {
            let mut video = std::mem::take(&mut container.video_region);
            video.crop(&state.viewport);
            video.intersect(requested);
            plan.video_rects = video.rects().to_vec();
        } else {
            let video = std::mem::take(&mut container.video_region);
            container.changed_region.add(&video);
        }
    }

    // Changed region: send the requested part, keep the rest pending.
    let mut send = container.changed_region.clone();
    send.crop(&state.viewport);
    send.intersect(requested);
    container.changed_region.subtract(&send);

    let bpp = state.client_format.bytes_per_pixel();
    let mut split = Vec::new();
    for rect in send.rects() {
        encoder_split(rect, bpp, &mut split);
    }

    plan.changed_rects = clamp_rect_count(plan.rect_count(), split, &send.bounding_rect(), bpp);
    Ok(plan)
}

/// The rect-count field is 16 bits. Collapse to the bounding rect
/// rather than truncating; resending too much is always safe.
fn clamp_rect_count(other_rects: usize, split: Vec<Rect>, bound: &Rect, bpp: usize) -> Vec<Rect> {
    if other_rects + split.len() <= msg::MAX_RECTS_PER_UPDATE {
        return split;
    }
    let mut collapsed = Vec::new();
    encoder_split(bound, bpp, &mut collapsed);
    collapsed
}

/// Raw band splitting, shared with the store's raw encoder.
fn encoder_split(rect: &Rect, bpp: usize, out: &mut Vec<Rect>) {
    use crate::sender::encoder::{Encoder, RawEncoder};
    RawEncoder.split_rectangle(rect, bpp, out);
}

// ── Serialization ────────────────────────────────────────────────

fn serialize_frame(
    state: &mut SenderState,
    plan: &FramePlan,
    palette: Option<BytesMut>,
    encoders: &mut EncoderStore,
) -> Result<BytesMut, RfbError> {
    let mut out = BytesMut::new();
    if let Some(palette) = palette {
        out.extend_from_slice(&palette);
    }

    out.put_u8(msg::SRV_FRAMEBUFFER_UPDATE);
    out.put_u8(0); // padding
    out.put_u16(plan.rect_count() as u16);

    if let Some(dim) = plan.desktop_size {
        put_rect_header(&mut out, &dim.rect(), msg::PSEUDO_DESKTOP_SIZE);
        return Ok(out);
    }

    if plan.cursor_shape {
        put_rich_cursor(&mut out, state)?;
    }
    if let Some(pos) = plan.cursor_pos {
        put_rect_header(
            &mut out,
            &Rect::with_size(pos.x.max(0), pos.y.max(0), 0, 0),
            msg::PSEUDO_POINTER_POS,
        );
    }

    // Every fragment of the copied region carries the same source
    // point, the origin of the move.
    for rect in &plan.copy_rects {
        put_rect_header(&mut out, rect, msg::ENCODING_COPYRECT);
        out.put_u16(plan.copy_src.x.max(0) as u16);
        out.put_u16(plan.copy_src.y.max(0) as u16);
    }

    // The client format can change between frames; retarget the
    // long-lived converter before encoding.
    let src = state.fb.format();
    state.converter.set_formats(&state.client_format, &src);

    for rect in &plan.video_rects {
        let encoder = encoders.select(msg::ENCODING_ZSTD_VIDEO);
        put_rect_header(&mut out, rect, encoder.code());
        encoder.encode_rectangle(&state.fb, rect, &state.converter, &mut out)?;
    }

    let content = plan.blank_frame.as_ref().unwrap_or(&state.fb);
    for rect in &plan.changed_rects {
        let encoder = encoders.select(state.options.preferred_encoding());
        put_rect_header(&mut out, rect, encoder.code());
        encoder.encode_rectangle(content, rect, &state.converter, &mut out)?;
    }

    Ok(out)
}

fn put_rect_header(out: &mut BytesMut, rect: &Rect, code: i32) {
    out.put_u16(rect.left.max(0) as u16);
    out.put_u16(rect.top.max(0) as u16);
    out.put_u16(rect.width().max(0) as u16);
    out.put_u16(rect.height().max(0) as u16);
    out.put_i32(code);
}

fn put_rich_cursor(out: &mut BytesMut, state: &mut SenderState) -> Result<(), RfbError> {
    let shape = state.cursor_shape.clone();
    let dim = shape.dimension();
    let hot = shape.hotspot();
    put_rect_header(
        &mut *out,
        &Rect::with_size(hot.x.max(0), hot.y.max(0), dim.width, dim.height),
        msg::PSEUDO_RICH_CURSOR,
    );
    let converter = PixelConverter::new(state.client_format, shape.pixels().format());
    converter.convert_rect(shape.pixels(), &dim.rect(), out);
    out.put_slice(shape.mask());
    Ok(())
}

/// `SetColorMapEntries` for an indexed client format. Each channel
/// value is widened to the u16 color range.
fn encode_color_map(format: &PixelFormat) -> BytesMut {
    let entries = 1usize << format.depth.min(8);
    let mut out = BytesMut::with_capacity(6 + entries * 6);
    out.put_u8(msg::SRV_SET_COLOR_MAP_ENTRIES);
    out.put_u8(0); // padding
    out.put_u16(0); // first color
    out.put_u16(entries as u16);
    for i in 0..entries as u32 {
        for (shift, max) in [
            (format.red_shift, format.red_max),
            (format.green_shift, format.green_max),
            (format.blue_shift, format.blue_max),
        ] {
            let channel = (i >> shift) & max as u32;
            let widened = if max == 0 { 0 } else { channel * 65535 / max as u32 };
            out.put_u16(widened as u16);
        }
    }
    out
}

/// The capability set every sender starts with.
fn default_registry() -> CapabilityRegistry {
    let mut reg = CapabilityRegistry::new();
    reg.add_encoding(msg::ENCODING_COPYRECT, msg::VENDOR_STANDARD, msg::SIG_COPYRECT);
    reg.add_encoding(msg::ENCODING_RAW, msg::VENDOR_STANDARD, msg::SIG_RAW);
    reg.add_encoding(msg::ENCODING_ZSTD_VIDEO, msg::VENDOR_RFBX, msg::SIG_ZSTD_VIDEO);
    reg.add_encoding(msg::PSEUDO_RICH_CURSOR, msg::VENDOR_STANDARD, msg::SIG_RICH_CURSOR);
    reg.add_encoding(msg::PSEUDO_POINTER_POS, msg::VENDOR_STANDARD, msg::SIG_POINTER_POS);
    reg.add_encoding(msg::PSEUDO_DESKTOP_SIZE, msg::VENDOR_STANDARD, msg::SIG_DESKTOP_SIZE);
    reg.add_client_message(msg::CLI_VIDEO_FREEZE as i32, msg::VENDOR_RFBX, msg::SIG_VIDEO_FREEZE);
    reg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender_100() -> Arc<UpdateSender> {
        UpdateSender::new(Dimension::new(100, 100), PixelFormat::rgb888())
    }

    fn screen_100() -> FrameBuffer {
        let mut fb = FrameBuffer::new(Dimension::new(100, 100), PixelFormat::rgb888());
        fb.fill(0x00336699);
        fb
    }

    fn request_full(sender: &UpdateSender) {
        sender.on_client_message(ClientMessage::UpdateRequest {
            incremental: false,
            rect: Rect::new(0, 0, 100, 100),
        });
    }

    fn dirty_container(rect: Rect) -> UpdateContainer {
        let mut c = UpdateContainer::new();
        c.changed_region.add_rect(&rect);
        c
    }

    /// Parse the header of an assembled frame: (rect_count, body).
    fn frame_header(frame: &BytesMut) -> (u16, &[u8]) {
        assert_eq!(frame[0], msg::SRV_FRAMEBUFFER_UPDATE);
        (u16::from_be_bytes([frame[2], frame[3]]), &frame[4..])
    }

    #[test]
    fn not_ready_without_request() {
        let sender = sender_100();
        let mut encoders = EncoderStore::new();
        assert!(!sender.client_is_ready());
        assert!(sender.prepare_frame(&mut encoders).unwrap().is_none());
    }

    #[test]
    fn full_request_sends_dirty_rect() {
        let sender = sender_100();
        sender
            .new_updates(
                &dirty_container(Rect::new(10, 10, 20, 20)),
                &screen_100(),
                &CursorShape::default(),
            )
            .unwrap();
        request_full(&sender);

        let mut encoders = EncoderStore::new();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (count, body) = frame_header(&frame);
        // Non-incremental request forces the whole 100×100 area, which
        // arrives as the dirty rect plus its complement fragments.
        assert!(count >= 1);
        let code = i32::from_be_bytes([body[8], body[9], body[10], body[11]]);
        assert_eq!(code, msg::ENCODING_RAW);

        // The request was consumed.
        assert!(!sender.client_is_ready());
    }

    #[test]
    fn incremental_request_outside_change_restores_both() {
        let sender = sender_100();
        sender
            .new_updates(
                &dirty_container(Rect::new(0, 0, 10, 10)),
                &screen_100(),
                &CursorShape::default(),
            )
            .unwrap();
        sender.on_client_message(ClientMessage::UpdateRequest {
            incremental: true,
            rect: Rect::new(50, 50, 100, 100),
        });

        let mut encoders = EncoderStore::new();
        assert!(sender.prepare_frame(&mut encoders).unwrap().is_none());
        // Request restored: a later overlapping change can answer it.
        assert!(sender.client_is_ready());

        sender
            .new_updates(
                &dirty_container(Rect::new(60, 60, 70, 70)),
                &screen_100(),
                &CursorShape::default(),
            )
            .unwrap();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (count, _) = frame_header(&frame);
        assert_eq!(count, 1);
    }

    #[test]
    fn change_outside_request_stays_pending() {
        let sender = sender_100();
        let mut container = dirty_container(Rect::new(0, 0, 10, 10));
        container.changed_region.add_rect(&Rect::new(80, 80, 90, 90));
        sender
            .new_updates(&container, &screen_100(), &CursorShape::default())
            .unwrap();
        sender.on_client_message(ClientMessage::UpdateRequest {
            incremental: true,
            rect: Rect::new(0, 0, 20, 20),
        });

        let mut encoders = EncoderStore::new();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (count, _) = frame_header(&frame);
        assert_eq!(count, 1);

        // The far rect is still pending for a later request.
        sender.on_client_message(ClientMessage::UpdateRequest {
            incremental: true,
            rect: Rect::new(0, 0, 100, 100),
        });
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (count, _) = frame_header(&frame);
        assert_eq!(count, 1);
    }

    #[test]
    fn copy_degrades_without_capability() {
        let sender = sender_100();
        let mut container = UpdateContainer::new();
        container.copied_region.add_rect(&Rect::new(30, 30, 40, 40));
        container.copy_src = Point::new(0, 0);
        sender
            .new_updates(&container, &screen_100(), &CursorShape::default())
            .unwrap();
        request_full(&sender);

        let mut encoders = EncoderStore::new();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (_, body) = frame_header(&frame);
        let code = i32::from_be_bytes([body[8], body[9], body[10], body[11]]);
        // No SetEncodings arrived, so no CopyRect may appear.
        assert_eq!(code, msg::ENCODING_RAW);
    }

    #[test]
    fn copy_sent_when_enabled_and_covered() {
        let sender = sender_100();
        sender.on_client_message(ClientMessage::SetEncodings {
            codes: vec![msg::ENCODING_RAW, msg::ENCODING_COPYRECT],
        });
        let mut container = UpdateContainer::new();
        container.copied_region.add_rect(&Rect::new(30, 30, 40, 40));
        container.copy_src = Point::new(5, 5);
        sender
            .new_updates(&container, &screen_100(), &CursorShape::default())
            .unwrap();
        sender.on_client_message(ClientMessage::UpdateRequest {
            incremental: true,
            rect: Rect::new(0, 0, 100, 100),
        });

        let mut encoders = EncoderStore::new();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (count, body) = frame_header(&frame);
        assert_eq!(count, 1);
        let code = i32::from_be_bytes([body[8], body[9], body[10], body[11]]);
        assert_eq!(code, msg::ENCODING_COPYRECT);
        let src_x = u16::from_be_bytes([body[12], body[13]]);
        let src_y = u16::from_be_bytes([body[14], body[15]]);
        assert_eq!((src_x, src_y), (5, 5));
    }

    #[test]
    fn desktop_size_preempts_content() {
        let sender = sender_100();
        sender.on_client_message(ClientMessage::SetEncodings {
            codes: vec![msg::ENCODING_RAW, msg::PSEUDO_DESKTOP_SIZE],
        });

        let mut bigger = FrameBuffer::new(Dimension::new(200, 150), PixelFormat::rgb888());
        bigger.fill(0x00101010);
        let mut container = dirty_container(Rect::new(0, 0, 10, 10));
        container.screen_size_changed = true;
        sender
            .new_updates(&container, &bigger, &CursorShape::default())
            .unwrap();
        request_full(&sender);

        let mut encoders = EncoderStore::new();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (count, body) = frame_header(&frame);
        assert_eq!(count, 1);
        let w = u16::from_be_bytes([body[4], body[5]]);
        let h = u16::from_be_bytes([body[6], body[7]]);
        assert_eq!((w, h), (200, 150));
        let code = i32::from_be_bytes([body[8], body[9], body[10], body[11]]);
        assert_eq!(code, msg::PSEUDO_DESKTOP_SIZE);
    }

    #[test]
    fn legacy_client_gets_blank_background_repaint_on_resize() {
        let sender = sender_100();
        let mut smaller = FrameBuffer::new(Dimension::new(60, 60), PixelFormat::rgb888());
        smaller.fill(0x00ffffff);
        let mut container = UpdateContainer::new();
        container.screen_size_changed = true;
        sender
            .new_updates(&container, &smaller, &CursorShape::default())
            .unwrap();
        request_full(&sender);

        let mut encoders = EncoderStore::new();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (count, body) = frame_header(&frame);
        // One raw rect spanning the whole announced 100×100 geometry.
        assert_eq!(count, 1);
        let w = u16::from_be_bytes([body[4], body[5]]);
        let h = u16::from_be_bytes([body[6], body[7]]);
        assert_eq!((w, h), (100, 100));

        // Screen pixels where the 60×60 screen still covers the frame,
        // blank background beyond it.
        let pixel = |x: usize, y: usize| {
            let at = 12 + (y * 100 + x) * 4;
            u32::from_le_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]])
        };
        assert_eq!(pixel(10, 10), 0x00ffffff);
        assert_eq!(pixel(90, 90), 0);
    }

    #[test]
    fn pointer_pos_rect_when_enabled() {
        let sender = sender_100();
        sender.on_client_message(ClientMessage::SetEncodings {
            codes: vec![msg::ENCODING_RAW, msg::PSEUDO_POINTER_POS],
        });
        let mut container = UpdateContainer::new();
        container.cursor_pos = Point::new(42, 24);
        container.cursor_pos_changed = true;
        sender
            .new_updates(&container, &screen_100(), &CursorShape::default())
            .unwrap();
        sender.on_client_message(ClientMessage::UpdateRequest {
            incremental: true,
            rect: Rect::new(0, 0, 100, 100),
        });

        let mut encoders = EncoderStore::new();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (count, body) = frame_header(&frame);
        assert_eq!(count, 1);
        let x = u16::from_be_bytes([body[0], body[1]]);
        let y = u16::from_be_bytes([body[2], body[3]]);
        assert_eq!((x, y), (42, 24));
        let code = i32::from_be_bytes([body[8], body[9], body[10], body[11]]);
        assert_eq!(code, msg::PSEUDO_POINTER_POS);
    }

    #[test]
    fn video_region_folds_into_changed_when_frozen() {
        let sender = sender_100();
        sender.on_client_message(ClientMessage::SetEncodings {
            codes: vec![msg::ENCODING_RAW, msg::ENCODING_ZSTD_VIDEO],
        });
        sender.on_client_message(ClientMessage::VideoFreeze { frozen: true });

        let mut container = UpdateContainer::new();
        container.video_region.add_rect(&Rect::new(0, 0, 32, 32));
        sender
            .new_updates(&container, &screen_100(), &CursorShape::default())
            .unwrap();
        sender.on_client_message(ClientMessage::UpdateRequest {
            incremental: true,
            rect: Rect::new(0, 0, 100, 100),
        });

        let mut encoders = EncoderStore::new();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (_, body) = frame_header(&frame);
        let code = i32::from_be_bytes([body[8], body[9], body[10], body[11]]);
        assert_eq!(code, msg::ENCODING_RAW);
    }

    #[test]
    fn video_region_streams_when_allowed() {
        let sender = sender_100();
        sender.on_client_message(ClientMessage::SetEncodings {
            codes: vec![msg::ENCODING_RAW, msg::ENCODING_ZSTD_VIDEO],
        });
        let mut container = UpdateContainer::new();
        container.video_region.add_rect(&Rect::new(0, 0, 32, 32));
        sender
            .new_updates(&container, &screen_100(), &CursorShape::default())
            .unwrap();
        sender.on_client_message(ClientMessage::UpdateRequest {
            incremental: true,
            rect: Rect::new(0, 0, 100, 100),
        });

        let mut encoders = EncoderStore::new();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (_, body) = frame_header(&frame);
        let code = i32::from_be_bytes([body[8], body[9], body[10], body[11]]);
        assert_eq!(code, msg::ENCODING_ZSTD_VIDEO);
    }

    #[test]
    fn color_map_precedes_update() {
        let sender = sender_100();
        sender.on_client_message(ClientMessage::SetPixelFormat {
            format: PixelFormat::indexed_332(),
            color_map: true,
        });
        sender
            .new_updates(
                &dirty_container(Rect::new(0, 0, 10, 10)),
                &screen_100(),
                &CursorShape::default(),
            )
            .unwrap();
        request_full(&sender);

        let mut encoders = EncoderStore::new();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        assert_eq!(frame[0], msg::SRV_SET_COLOR_MAP_ENTRIES);
        let entries = u16::from_be_bytes([frame[4], frame[5]]);
        assert_eq!(entries, 256);
        // Entry 255 maps to full-intensity red (3-3-2: r = 7).
        let last = 6 + 255 * 6;
        let red = u16::from_be_bytes([frame[last], frame[last + 1]]);
        assert_eq!(red, 65535);
    }

    #[test]
    fn full_request_resends_cursor_shape() {
        let sender = sender_100();
        sender.on_client_message(ClientMessage::SetEncodings {
            codes: vec![
                msg::ENCODING_RAW,
                msg::PSEUDO_RICH_CURSOR,
                msg::PSEUDO_DESKTOP_SIZE,
            ],
        });

        let shape =
            CursorShape::new(Dimension::new(8, 8), PixelFormat::rgb888(), Point::new(1, 2));
        let mut container = dirty_container(Rect::new(0, 0, 10, 10));
        container.cursor_shape_changed = true;
        sender.new_updates(&container, &screen_100(), &shape).unwrap();
        request_full(&sender);

        let mut encoders = EncoderStore::new();
        sender.prepare_frame(&mut encoders).unwrap().unwrap();

        // The shape has not changed since, but the next full request
        // still opens with it.
        sender
            .new_updates(
                &dirty_container(Rect::new(0, 0, 10, 10)),
                &screen_100(),
                &CursorShape::default(),
            )
            .unwrap();
        request_full(&sender);
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (_, body) = frame_header(&frame);
        let code = i32::from_be_bytes([body[8], body[9], body[10], body[11]]);
        assert_eq!(code, msg::PSEUDO_RICH_CURSOR);
        let w = u16::from_be_bytes([body[4], body[5]]);
        assert_eq!(w, 8);
    }

    #[test]
    fn copy_fragments_share_one_source_point() {
        let sender = sender_100();
        sender.on_client_message(ClientMessage::SetEncodings {
            codes: vec![msg::ENCODING_RAW, msg::ENCODING_COPYRECT],
        });
        // A dirty strip across the middle of the copy destination
        // splits the copy into two fragments.
        let mut container = UpdateContainer::new();
        container.changed_region.add_rect(&Rect::new(10, 20, 40, 24));
        container.copied_region.add_rect(&Rect::new(10, 10, 40, 34));
        container.copy_src = Point::new(2, 3);
        sender
            .new_updates(&container, &screen_100(), &CursorShape::default())
            .unwrap();
        sender.on_client_message(ClientMessage::UpdateRequest {
            incremental: true,
            rect: Rect::new(0, 0, 100, 100),
        });

        let mut encoders = EncoderStore::new();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (count, body) = frame_header(&frame);
        // Two copy fragments plus the dirty strip itself.
        assert_eq!(count, 3);
        // Both CopyRect entries name the same source point, the origin
        // of the whole move.
        for at in [0, 16] {
            let code =
                i32::from_be_bytes([body[at + 8], body[at + 9], body[at + 10], body[at + 11]]);
            assert_eq!(code, msg::ENCODING_COPYRECT);
            let src_x = u16::from_be_bytes([body[at + 12], body[at + 13]]);
            let src_y = u16::from_be_bytes([body[at + 14], body[at + 15]]);
            assert_eq!((src_x, src_y), (2, 3));
        }
    }

    #[test]
    fn shrunken_screen_clamps_viewport_and_repaints() {
        let sender = sender_100();
        sender.on_client_message(ClientMessage::SetEncodings {
            codes: vec![msg::ENCODING_RAW, msg::ENCODING_COPYRECT],
        });
        let mut smaller = FrameBuffer::new(Dimension::new(60, 60), PixelFormat::rgb888());
        smaller.fill(0x00224466);
        let mut container = UpdateContainer::new();
        container.copied_region.add_rect(&Rect::new(20, 20, 40, 40));
        container.copy_src = Point::new(0, 0);
        sender
            .new_updates(&container, &smaller, &CursorShape::default())
            .unwrap();
        sender.on_client_message(ClientMessage::UpdateRequest {
            incremental: true,
            rect: Rect::new(0, 0, 100, 100),
        });

        let mut encoders = EncoderStore::new();
        let frame = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        let (count, body) = frame_header(&frame);
        // The pending copy is gone; the clamped viewport comes back as
        // one full raw repaint.
        assert_eq!(count, 1);
        let x = u16::from_be_bytes([body[0], body[1]]);
        let y = u16::from_be_bytes([body[2], body[3]]);
        let w = u16::from_be_bytes([body[4], body[5]]);
        let h = u16::from_be_bytes([body[6], body[7]]);
        assert_eq!((x, y, w, h), (0, 0, 60, 60));
        let code = i32::from_be_bytes([body[8], body[9], body[10], body[11]]);
        assert_eq!(code, msg::ENCODING_RAW);
    }

    #[test]
    fn rect_count_collapses_to_bounding_rect() {
        let bound = Rect::new(0, 0, 300, 300);
        let split: Vec<Rect> = (0..70_000)
            .map(|i| Rect::with_size(i % 300, i / 300, 1, 1))
            .collect();
        assert!(split.len() > msg::MAX_RECTS_PER_UPDATE);

        let clamped = clamp_rect_count(2, split, &bound, 4);
        let mut expect = Vec::new();
        encoder_split(&bound, 4, &mut expect);
        assert_eq!(clamped, expect);
        assert!(2 + clamped.len() <= msg::MAX_RECTS_PER_UPDATE);

        // Under the cap the split passes through untouched.
        let few = vec![Rect::with_size(0, 0, 1, 1)];
        assert_eq!(clamp_rect_count(2, few.clone(), &bound, 4), few);
    }

    #[test]
    fn color_map_sent_once() {
        let sender = sender_100();
        sender.on_client_message(ClientMessage::SetPixelFormat {
            format: PixelFormat::indexed_332(),
            color_map: true,
        });
        let mut encoders = EncoderStore::new();
        for _ in 0..2 {
            sender
                .new_updates(
                    &dirty_container(Rect::new(0, 0, 10, 10)),
                    &screen_100(),
                    &CursorShape::default(),
                )
                .unwrap();
            request_full(&sender);
        }
        let first = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        assert_eq!(first[0], msg::SRV_SET_COLOR_MAP_ENTRIES);
        // Second frame must not repeat the palette. Need a fresh dirty
        // rect because the first frame consumed everything.
        sender
            .new_updates(
                &dirty_container(Rect::new(0, 0, 10, 10)),
                &screen_100(),
                &CursorShape::default(),
            )
            .unwrap();
        request_full(&sender);
        let second = sender.prepare_frame(&mut encoders).unwrap().unwrap();
        assert_eq!(second[0], msg::SRV_FRAMEBUFFER_UPDATE);
    }
}
