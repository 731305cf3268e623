//! State of the segmentation page for one annotator.
//!
//! Network work is split so results can arrive late: `begin_*` captures a
//! ticket, the backend call runs without borrowing the workspace, and
//! `finish_*` applies the result only if the ticket is still current.

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use image::RgbaImage;
use iris_common::{ImageInfoSummary, IrisConfig, IrisUser, MaskShape, UserConfigResponse};
use mask::{
    BrushStroke, ClassPalette, DisplayMode, EraserStroke, MaskBuffers, MaskEditor, PixelPoint,
    ViewFilters, Viewport,
    edits::{DEFAULT_BRUSH_SIZE, DEFAULT_ERASER_SIZE},
    render_overlay,
};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::{debug, info, warn};

use crate::{
    backend::SegmentationBackend,
    commands::WorkspaceCommand,
    error::{ClientError, Result},
};

/// How long a notice stays on screen unless overridden
pub const DEFAULT_NOTICE_DURATION: Duration = Duration::from_secs(3);

pub const BRIGHTNESS_STEP: i64 = 10;
pub const SATURATION_STEP: i64 = 50;

/// Shared flag checked before an async result is applied
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Global loading indicator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoaderState {
    #[default]
    Idle,
    Loading(String),
}

impl LoaderState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Loading(message) => Some(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient, auto-dismissing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub level: NoticeLevel,
    pub duration: Duration,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NoticeLevel::Info,
            duration: DEFAULT_NOTICE_DURATION,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NoticeLevel::Error,
            duration: DEFAULT_NOTICE_DURATION,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Allows one in-flight save per image
#[derive(Debug, Clone, Default)]
pub struct SaveGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SaveGuard {
    pub fn try_acquire(&self, image_id: &str) -> Option<SavePermit> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(image_id.to_string()) {
            return None;
        }
        Some(SavePermit {
            guard: self.clone(),
            image_id: image_id.to_string(),
        })
    }

    pub fn is_saving(&self, image_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(image_id)
    }
}

/// Released when dropped
#[derive(Debug)]
pub struct SavePermit {
    guard: SaveGuard,
    image_id: String,
}

impl Drop for SavePermit {
    fn drop(&mut self) {
        self.guard
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.image_id);
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Display, EnumString, EnumIter, IntoStaticStr
)]
#[strum(serialize_all = "snake_case")]
pub enum Tool {
    #[default]
    Move,
    Draw,
    Eraser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    Next,
    Previous,
}

/// Identifies one image load
#[derive(Debug, Clone)]
pub struct LoadTicket {
    image_id: String,
    generation: u64,
    cancel: CancelFlag,
}

impl LoadTicket {
    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Everything fetched for one image
#[derive(Debug, Clone, Default)]
pub struct LoadedImage {
    pub mask: Option<MaskBuffers>,
    pub info: Option<ImageInfoSummary>,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// A newer load started or the workspace was torn down
    Stale,
    Failed,
}

/// An encoded mask on its way to the backend
#[derive(Debug)]
pub struct SaveTicket {
    _permit: SavePermit,
    image_id: String,
    generation: u64,
    payload: Vec<u8>,
}

impl SaveTicket {
    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[derive(Debug)]
pub struct SegmentationWorkspace {
    config: IrisConfig,
    palette: ClassPalette,
    user: Option<IrisUser>,
    image_id: Option<String>,
    image_location: [f64; 2],
    image_info: Option<ImageInfoSummary>,
    metadata: Option<Map<String, Value>>,
    editor: Option<MaskEditor>,
    tool: Tool,
    current_class: u8,
    brush_size: u32,
    eraser_size: u32,
    display_mode: DisplayMode,
    show_mask: bool,
    show_view_controls: bool,
    view_group: Option<String>,
    filters: ViewFilters,
    viewport: Viewport,
    loader: LoaderState,
    notices: VecDeque<(Instant, Notice)>,
    stroke_anchor: Option<PixelPoint>,
    auth_required: bool,
    generation: u64,
    cancel: CancelFlag,
    saves: SaveGuard,
}

impl SegmentationWorkspace {
    pub fn new(config: IrisConfig) -> Self {
        let view_group = config.view_groups.keys().next().cloned();
        Self {
            palette: ClassPalette::from_classes(&config.classes),
            config,
            user: None,
            image_id: None,
            image_location: [0.0, 0.0],
            image_info: None,
            metadata: None,
            editor: None,
            tool: Tool::default(),
            current_class: 0,
            brush_size: DEFAULT_BRUSH_SIZE,
            eraser_size: DEFAULT_ERASER_SIZE,
            display_mode: DisplayMode::default(),
            show_mask: true,
            show_view_controls: false,
            view_group,
            filters: ViewFilters::default(),
            viewport: Viewport::default(),
            loader: LoaderState::Idle,
            notices: VecDeque::new(),
            stroke_anchor: None,
            auth_required: false,
            generation: 0,
            cancel: CancelFlag::new(),
            saves: SaveGuard::default(),
        }
    }

    pub fn with_user(mut self, user: IrisUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn config(&self) -> &IrisConfig {
        &self.config
    }

    pub fn user(&self) -> Option<&IrisUser> {
        self.user.as_ref()
    }

    pub fn image_id(&self) -> Option<&str> {
        self.image_id.as_deref()
    }

    pub fn image_location(&self) -> [f64; 2] {
        self.image_location
    }

    pub fn set_image_location(&mut self, location: [f64; 2]) {
        self.image_location = location;
    }

    pub fn image_info(&self) -> Option<&ImageInfoSummary> {
        self.image_info.as_ref()
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref()
    }

    pub fn editor(&self) -> Option<&MaskEditor> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut MaskEditor> {
        self.editor.as_mut()
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.stroke_anchor = None;
    }

    pub fn current_class(&self) -> u8 {
        self.current_class
    }

    pub fn set_brush_size(&mut self, size: u32) {
        self.brush_size = size.max(1);
    }

    pub fn set_eraser_size(&mut self, size: u32) {
        self.eraser_size = size.max(1);
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn show_mask(&self) -> bool {
        self.show_mask
    }

    pub fn show_view_controls(&self) -> bool {
        self.show_view_controls
    }

    pub fn view_group(&self) -> Option<&str> {
        self.view_group.as_deref()
    }

    pub fn filters(&self) -> &ViewFilters {
        &self.filters
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn loader(&self) -> &LoaderState {
        &self.loader
    }

    pub fn auth_required(&self) -> bool {
        self.auth_required
    }

    pub fn is_saving(&self) -> bool {
        self.image_id
            .as_deref()
            .is_some_and(|id| self.saves.is_saving(id))
    }

    // Notices

    pub fn notify(&mut self, notice: Notice) {
        let now = Instant::now();
        self.expire_notices(now);
        debug!(message = %notice.message, "Notice");
        self.notices.push_back((now, notice));
    }

    /// Notices still on screen
    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        let now = Instant::now();
        self.notices
            .iter()
            .filter(move |(shown, notice)| now.saturating_duration_since(*shown) < notice.duration)
            .map(|(_, notice)| notice)
    }

    /// Drop notices whose display time has passed by `now`; returns how many
    pub fn expire_notices(&mut self, now: Instant) -> usize {
        let before = self.notices.len();
        self.notices
            .retain(|(shown, notice)| now.saturating_duration_since(*shown) < notice.duration);
        before - self.notices.len()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).map(|(_, notice)| notice).collect()
    }

    fn report(&mut self, context: &str, error: &ClientError) {
        if error.is_auth_required() {
            self.auth_required = true;
        }
        warn!(%error, "{context}");
        self.notify(Notice::error(format!("{context}: {error}")));
    }

    /// Cancel everything in flight; late results are dropped
    pub fn teardown(&mut self) {
        self.cancel.cancel();
        self.cancel = CancelFlag::new();
        self.loader = LoaderState::Idle;
        self.stroke_anchor = None;
        info!("Workspace torn down");
    }

    // Loading

    pub fn begin_load(&mut self, image_id: impl Into<String>) -> LoadTicket {
        self.generation += 1;
        let image_id = image_id.into();
        self.loader = LoaderState::Loading(format!("Loading image {image_id}..."));
        debug!(image_id = %image_id, generation = self.generation, "Begin load");
        LoadTicket {
            image_id,
            generation: self.generation,
            cancel: self.cancel.clone(),
        }
    }

    /// Fetch mask, image info and metadata concurrently. Only the mask is
    /// required; the other two degrade to `None`.
    pub async fn fetch_image<B: SegmentationBackend>(
        backend: &B,
        ticket: &LoadTicket,
        shape: MaskShape,
    ) -> Result<LoadedImage> {
        let image_id = ticket.image_id();
        let (mask, info, metadata) = tokio::join!(
            backend.load_mask(image_id, shape),
            backend.image_info(image_id),
            backend.metadata(image_id),
        );
        let info = info
            .map_err(|error| warn!(image_id, %error, "Image info unavailable"))
            .ok();
        let metadata = metadata
            .map_err(|error| warn!(image_id, %error, "Metadata unavailable"))
            .ok();
        Ok(LoadedImage {
            mask: mask?,
            info,
            metadata,
        })
    }

    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<LoadedImage>) -> LoadOutcome {
        if ticket.generation != self.generation || ticket.cancel.is_cancelled() {
            debug!(
                image_id = %ticket.image_id,
                generation = ticket.generation,
                current = self.generation,
                "Dropping stale load"
            );
            return LoadOutcome::Stale;
        }
        self.loader = LoaderState::Idle;

        let loaded = match result {
            Ok(loaded) => loaded,
            Err(error) => {
                self.report("Unable to load image", &error);
                return LoadOutcome::Failed;
            }
        };
        let editor = match MaskEditor::new(self.config.mask_shape(), loaded.mask, self.config.class_count()) {
            Ok(editor) => editor,
            Err(error) => {
                self.report("Unable to load image", &ClientError::from(error));
                return LoadOutcome::Failed;
            }
        };

        info!(
            image_id = %ticket.image_id,
            mask_available = editor.mask_available(),
            "Image loaded"
        );
        self.image_id = Some(ticket.image_id);
        self.image_info = loaded.info;
        self.metadata = loaded.metadata;
        self.editor = Some(editor);
        self.stroke_anchor = None;
        self.viewport.reset();
        LoadOutcome::Applied
    }

    pub async fn load_image<B: SegmentationBackend>(&mut self, backend: &B, image_id: &str) -> LoadOutcome {
        let ticket = self.begin_load(image_id);
        let result = Self::fetch_image(backend, &ticket, self.config.mask_shape()).await;
        self.finish_load(ticket, result)
    }

    // Saving

    pub fn begin_save(&mut self) -> Result<SaveTicket> {
        let (Some(image_id), Some(editor)) = (self.image_id.clone(), self.editor.as_ref()) else {
            return Err(ClientError::NoImage);
        };
        if !editor.mask_available() {
            return Err(ClientError::Validation("No mask edits to save yet.".to_string()));
        }
        let permit = self
            .saves
            .try_acquire(&image_id)
            .ok_or_else(|| ClientError::SaveInProgress(image_id.clone()))?;
        let payload = editor.encode();
        self.loader = LoaderState::Loading("Saving mask...".to_string());
        Ok(SaveTicket {
            _permit: permit,
            image_id,
            generation: self.generation,
            payload,
        })
    }

    pub fn finish_save(&mut self, ticket: SaveTicket, result: Result<()>) -> Result<()> {
        self.loader = LoaderState::Idle;
        match result {
            Ok(()) => {
                // Only clear the dirty flag if the editor still shows what was sent
                if ticket.generation == self.generation {
                    if let Some(editor) = self.editor.as_mut() {
                        if editor.encode() == ticket.payload {
                            editor.mark_saved();
                        }
                    }
                }
                self.notify(Notice::info("Mask saved successfully."));
                Ok(())
            }
            Err(error) => {
                self.report("Unable to save mask", &error);
                Err(error)
            }
        }
    }

    pub async fn save<B: SegmentationBackend>(&mut self, backend: &B) -> Result<()> {
        let ticket = match self.begin_save() {
            Ok(ticket) => ticket,
            Err(error) => {
                self.notify(Notice::error(error.to_string()));
                return Err(error);
            }
        };
        let result = backend.save_mask(ticket.image_id(), ticket.payload().to_vec()).await;
        self.finish_save(ticket, result)
    }

    // Navigation

    /// Save unsaved edits, then open the neighbouring image
    pub async fn navigate<B: SegmentationBackend>(
        &mut self,
        backend: &B,
        direction: Direction,
    ) -> Result<LoadOutcome> {
        let current = self.image_id.clone().ok_or(ClientError::NoImage)?;
        // A reset mask has nothing to save and must not block navigation
        let unsaved = self
            .editor
            .as_ref()
            .is_some_and(|editor| editor.is_dirty() && editor.mask_available());
        if unsaved {
            self.save(backend).await?;
        }

        self.loader = LoaderState::Loading(format!("Loading {direction} image..."));
        let neighbour = match direction {
            Direction::Next => backend.next_image_id(&current).await,
            Direction::Previous => backend.previous_image_id(&current).await,
        };
        match neighbour {
            Ok(image_id) => Ok(self.load_image(backend, &image_id).await),
            Err(error) => {
                self.loader = LoaderState::Idle;
                self.report(&format!("Unable to load {direction} image"), &error);
                Err(error)
            }
        }
    }

    pub async fn next_image<B: SegmentationBackend>(&mut self, backend: &B) -> Result<LoadOutcome> {
        self.navigate(backend, Direction::Next).await
    }

    pub async fn previous_image<B: SegmentationBackend>(&mut self, backend: &B) -> Result<LoadOutcome> {
        self.navigate(backend, Direction::Previous).await
    }

    // Prediction

    /// Ask the model for a mask and merge it under the user's marks
    pub async fn predict<B: SegmentationBackend>(&mut self, backend: &B) -> Result<bool> {
        let (Some(image_id), Some(editor)) = (self.image_id.clone(), self.editor.as_ref()) else {
            return Err(ClientError::NoImage);
        };
        let payload = editor.predict_payload();
        let generation = self.generation;
        let cancel = self.cancel.clone();

        self.loader = LoaderState::Loading("Predicting mask...".to_string());
        let result = backend.predict_mask(&image_id, &payload).await;
        self.loader = LoaderState::Idle;
        if generation != self.generation || cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let merged = result.and_then(|prediction| {
            let editor = self.editor.as_mut().ok_or(ClientError::NoImage)?;
            Ok(editor.merge_prediction(prediction)?)
        });
        if let Err(error) = &merged {
            self.report("Unable to predict mask", error);
        }
        merged
    }

    // User and preferences

    pub async fn refresh_user<B: SegmentationBackend>(&mut self, backend: &B) -> Result<()> {
        match backend.current_user().await {
            Ok(user) => {
                if let Some(config) = user.config.clone() {
                    self.set_config(config);
                }
                self.auth_required = false;
                self.user = Some(user);
                Ok(())
            }
            Err(error) => {
                self.report("Unable to load user", &error);
                Err(error)
            }
        }
    }

    pub async fn load_preferences<B: SegmentationBackend>(
        &mut self,
        backend: &B,
    ) -> Result<UserConfigResponse> {
        match backend.user_config().await {
            Ok(response) => {
                self.set_config(response.config.clone());
                Ok(response)
            }
            Err(error) => {
                self.report("Failed to load preferences", &error);
                Err(error)
            }
        }
    }

    /// Validate locally, then store the preferences on the backend
    pub async fn save_preferences<B: SegmentationBackend>(
        &mut self,
        backend: &B,
        config: IrisConfig,
    ) -> Result<()> {
        if let Err(error) = config.segmentation.ai_model.validate_for_save() {
            let message = error.to_string();
            self.notify(Notice::error(message.clone()));
            return Err(ClientError::Validation(message));
        }
        match backend.save_user_config(&config).await {
            Ok(message) => {
                self.set_config(config);
                if !message.is_empty() {
                    self.notify(Notice::info(message));
                }
                Ok(())
            }
            Err(error) => {
                self.report("Failed to save preferences", &error);
                Err(error)
            }
        }
    }

    fn set_config(&mut self, config: IrisConfig) {
        self.palette = ClassPalette::from_classes(&config.classes);
        if self
            .view_group
            .as_ref()
            .is_none_or(|group| !config.view_groups.contains_key(group))
        {
            self.view_group = config.view_groups.keys().next().cloned();
        }
        self.config = config;
    }

    // Editing

    pub fn select_class(&mut self, class: u8) -> bool {
        if (class as usize) < self.config.class_count() {
            self.current_class = class;
            true
        } else {
            false
        }
    }

    /// Live stroke step at a mask pixel with the current tool. Consecutive
    /// samples of one stroke are joined.
    pub fn stroke_at(&mut self, point: PixelPoint) -> bool {
        let Some(editor) = self.editor.as_mut() else {
            return false;
        };
        let points = match self.stroke_anchor.replace(point) {
            Some(previous) => vec![previous, point],
            None => vec![point],
        };
        match self.tool {
            Tool::Move => false,
            Tool::Draw => editor
                .apply(&BrushStroke::new(points, self.current_class).with_size(self.brush_size)),
            Tool::Eraser => editor.apply(&EraserStroke::new(points).with_size(self.eraser_size)),
        }
    }

    /// Pointer released: make the stroke undoable
    pub fn end_stroke(&mut self) -> bool {
        self.stroke_anchor = None;
        self.editor.as_mut().is_some_and(MaskEditor::checkpoint)
    }

    /// Overlay for the mask canvas, `None` while the mask is hidden
    pub fn overlay(&self) -> Option<mask::Result<RgbaImage>> {
        if !self.show_mask {
            return None;
        }
        let editor = self.editor.as_ref()?;
        Some(render_overlay(
            editor.buffers(),
            editor.shape(),
            &self.palette,
            self.display_mode,
            editor.last_prediction(),
        ))
    }

    /// Apply a command that needs no backend; returns whether it was handled
    pub fn handle_command(&mut self, command: WorkspaceCommand) -> bool {
        match command {
            WorkspaceCommand::Undo => self.editor.as_mut().is_some_and(MaskEditor::undo),
            WorkspaceCommand::Redo => self.editor.as_mut().is_some_and(MaskEditor::redo),
            WorkspaceCommand::ResetMask => match self.editor.as_mut() {
                Some(editor) => {
                    editor.reset();
                    true
                }
                None => false,
            },
            WorkspaceCommand::ToolMove => self.switch_tool(Tool::Move),
            WorkspaceCommand::ToolDraw => self.switch_tool(Tool::Draw),
            WorkspaceCommand::ToolEraser => self.switch_tool(Tool::Eraser),
            WorkspaceCommand::ToolResetViews => {
                self.viewport.reset();
                true
            }
            WorkspaceCommand::ToggleMask => {
                self.show_mask = !self.show_mask;
                true
            }
            WorkspaceCommand::MaskFinal => self.switch_mode(DisplayMode::Final),
            WorkspaceCommand::MaskUser => self.switch_mode(DisplayMode::User),
            WorkspaceCommand::MaskErrors => self.switch_mode(DisplayMode::Errors),
            WorkspaceCommand::ToggleContrast => {
                self.filters.toggle_contrast();
                true
            }
            WorkspaceCommand::ToggleInvert => {
                self.filters.toggle_invert();
                true
            }
            WorkspaceCommand::BrightnessUp => {
                self.filters.adjust_brightness(BRIGHTNESS_STEP);
                true
            }
            WorkspaceCommand::BrightnessDown => {
                self.filters.adjust_brightness(-BRIGHTNESS_STEP);
                true
            }
            WorkspaceCommand::SaturationUp => {
                self.filters.adjust_saturation(SATURATION_STEP);
                true
            }
            WorkspaceCommand::SaturationDown => {
                self.filters.adjust_saturation(-SATURATION_STEP);
                true
            }
            WorkspaceCommand::ResetFilters => {
                self.filters = ViewFilters::default();
                true
            }
            WorkspaceCommand::ShowViewControls => {
                self.show_view_controls = !self.show_view_controls;
                true
            }
            WorkspaceCommand::NextViewGroup => self.next_view_group(),
            WorkspaceCommand::SelectClass
            | WorkspaceCommand::PreviousImage
            | WorkspaceCommand::NextImage
            | WorkspaceCommand::SaveMask
            | WorkspaceCommand::PredictMask => false,
        }
    }

    fn switch_tool(&mut self, tool: Tool) -> bool {
        self.set_tool(tool);
        true
    }

    fn switch_mode(&mut self, mode: DisplayMode) -> bool {
        self.display_mode = mode;
        true
    }

    fn next_view_group(&mut self) -> bool {
        let groups: Vec<&String> = self.config.view_groups.keys().collect();
        if groups.is_empty() {
            return false;
        }
        let next = match &self.view_group {
            Some(current) => groups
                .iter()
                .position(|group| *group == current)
                .map_or(0, |index| (index + 1) % groups.len()),
            None => 0,
        };
        self.view_group = Some(groups[next].clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::AtomicUsize,
    };

    use mask::{PredictMaskPayload, codec};
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct FakeBackend {
        masks: Mutex<HashMap<String, Vec<u8>>>,
        order: Vec<String>,
        prediction: Vec<u8>,
        forbidden: bool,
        saves: AtomicUsize,
        config_saves: AtomicUsize,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                order: vec!["a".into(), "b".into(), "c".into()],
                prediction: vec![2, 2, 2, 2],
                ..Self::default()
            }
        }

        fn check(&self) -> Result<()> {
            if self.forbidden {
                return Err(ClientError::Status {
                    status: 403,
                    message: "Forbidden".into(),
                });
            }
            Ok(())
        }

        fn neighbour(&self, current: &str, step: isize) -> Result<String> {
            let index = self.order.iter().position(|id| id == current).unwrap_or(0) as isize;
            let len = self.order.len() as isize;
            Ok(self.order[((index + step).rem_euclid(len)) as usize].clone())
        }
    }

    impl SegmentationBackend for FakeBackend {
        async fn current_user(&self) -> Result<IrisUser> {
            self.check()?;
            Ok(serde_json::from_value(json!({"id": 1, "name": "ada"}))?)
        }

        async fn user_config(&self) -> Result<UserConfigResponse> {
            self.check()?;
            Ok(UserConfigResponse {
                config: config(),
                all_bands: vec!["B1".into(), "B2".into()],
                is_admin: false,
            }
            .resolve_bands())
        }

        async fn save_user_config(&self, _config: &IrisConfig) -> Result<String> {
            self.check()?;
            self.config_saves.fetch_add(1, Ordering::SeqCst);
            Ok("Saved user config successfully!".into())
        }

        async fn load_mask(&self, image_id: &str, shape: MaskShape) -> Result<Option<MaskBuffers>> {
            self.check()?;
            let masks = self.masks.lock().unwrap();
            Ok(masks.get(image_id).and_then(|bytes| codec::decode_for_shape(bytes, shape)))
        }

        async fn save_mask(&self, image_id: &str, payload: Vec<u8>) -> Result<()> {
            self.check()?;
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.masks.lock().unwrap().insert(image_id.to_string(), payload);
            Ok(())
        }

        async fn predict_mask(&self, _image_id: &str, _payload: &PredictMaskPayload) -> Result<Vec<u8>> {
            self.check()?;
            Ok(self.prediction.clone())
        }

        async fn next_image_id(&self, current: &str) -> Result<String> {
            self.check()?;
            self.neighbour(current, 1)
        }

        async fn previous_image_id(&self, current: &str) -> Result<String> {
            self.check()?;
            self.neighbour(current, -1)
        }

        async fn image_info(&self, image_id: &str) -> Result<ImageInfoSummary> {
            Ok(serde_json::from_value(json!({"id": image_id}))?)
        }

        async fn metadata(&self, _image_id: &str) -> Result<Map<String, Value>> {
            Err(ClientError::Status {
                status: 404,
                message: "Not Found".into(),
            })
        }
    }

    fn config() -> IrisConfig {
        serde_json::from_value(json!({
            "name": "test",
            "images": {"path": "images/{id}.tif", "shape": [4, 4]},
            "view_groups": {"default": ["RGB"], "radar": ["SAR"]},
            "segmentation": {"mask_shape": [2, 2], "ai_model": {"bands": ["B1"]}},
            "classes": [
                {"name": "Clear", "colour": [0, 0, 0, 0]},
                {"name": "Cloud", "colour": [255, 255, 0]},
                {"name": "Shadow", "colour": [0, 0, 255]}
            ]
        }))
        .unwrap()
    }

    fn workspace() -> SegmentationWorkspace {
        SegmentationWorkspace::new(config())
    }

    #[tokio::test]
    async fn test_load_without_saved_mask() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        assert_eq!(workspace.load_image(&backend, "a").await, LoadOutcome::Applied);

        let editor = workspace.editor().unwrap();
        assert!(!editor.mask_available());
        assert_eq!(editor.buffers().mask(), &[0, 0, 0, 0]);
        assert_eq!(workspace.image_id(), Some("a"));
        assert_eq!(workspace.image_info().unwrap().id, "a");
        assert!(workspace.metadata().is_none());
        assert_eq!(workspace.loader(), &LoaderState::Idle);
    }

    #[tokio::test]
    async fn test_load_with_saved_mask() {
        let backend = FakeBackend::new();
        backend
            .masks
            .lock()
            .unwrap()
            .insert("a".into(), vec![254, 1, 0, 0, 2, 1, 0, 0, 1, 254]);
        let mut workspace = workspace();
        workspace.load_image(&backend, "a").await;
        let editor = workspace.editor().unwrap();
        assert!(editor.mask_available());
        assert_eq!(editor.stats().class_counts, vec![0, 1, 1]);
    }

    #[tokio::test]
    async fn test_stale_load_is_dropped() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        let shape = workspace.config().mask_shape();

        let first = workspace.begin_load("a");
        let second = workspace.begin_load("b");
        let first_result = SegmentationWorkspace::fetch_image(&backend, &first, shape).await;
        let second_result = SegmentationWorkspace::fetch_image(&backend, &second, shape).await;

        assert_eq!(workspace.finish_load(second, second_result), LoadOutcome::Applied);
        assert_eq!(workspace.finish_load(first, first_result), LoadOutcome::Stale);
        assert_eq!(workspace.image_id(), Some("b"));
    }

    #[tokio::test]
    async fn test_cancelled_load_is_dropped() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        let ticket = workspace.begin_load("a");
        let result = SegmentationWorkspace::fetch_image(&backend, &ticket, workspace.config().mask_shape()).await;
        workspace.teardown();
        assert_eq!(workspace.finish_load(ticket, result), LoadOutcome::Stale);
        assert!(workspace.editor().is_none());
        assert!(!workspace.loader().is_loading());
    }

    #[tokio::test]
    async fn test_one_save_in_flight() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        workspace.load_image(&backend, "a").await;
        workspace.set_tool(Tool::Draw);
        workspace.stroke_at(PixelPoint::new(0, 0));
        workspace.end_stroke();

        let ticket = workspace.begin_save().unwrap();
        assert!(workspace.is_saving());
        assert!(matches!(workspace.begin_save(), Err(ClientError::SaveInProgress(_))));

        workspace.finish_save(ticket, Ok(())).unwrap();
        assert!(!workspace.is_saving());
        assert!(!workspace.editor().unwrap().is_dirty());
        assert!(workspace.begin_save().is_ok());
    }

    #[tokio::test]
    async fn test_nothing_to_save() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        workspace.load_image(&backend, "a").await;
        let error = workspace.save(&backend).await.unwrap_err();
        assert_eq!(error.to_string(), "No mask edits to save yet.");
        assert_eq!(backend.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_navigation_saves_dirty_mask_first() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        workspace.load_image(&backend, "a").await;
        workspace.select_class(1);
        workspace.set_tool(Tool::Draw);
        workspace.stroke_at(PixelPoint::new(1, 1));
        workspace.end_stroke();

        assert_eq!(workspace.next_image(&backend).await.unwrap(), LoadOutcome::Applied);
        assert_eq!(workspace.image_id(), Some("b"));
        assert_eq!(backend.saves.load(Ordering::SeqCst), 1);
        assert!(backend.masks.lock().unwrap().contains_key("a"));

        assert_eq!(workspace.previous_image(&backend).await.unwrap(), LoadOutcome::Applied);
        assert_eq!(workspace.image_id(), Some("a"));
        assert!(workspace.editor().unwrap().mask_available());
        // Clean navigation does not save again
        assert_eq!(backend.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_predict_keeps_user_pixels() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        workspace.load_image(&backend, "a").await;
        workspace.select_class(1);
        workspace.set_tool(Tool::Draw);
        workspace.set_brush_size(1);
        workspace.stroke_at(PixelPoint::new(0, 0));
        workspace.end_stroke();

        assert!(workspace.predict(&backend).await.unwrap());
        let editor = workspace.editor().unwrap();
        assert_eq!(editor.buffers().mask(), &[1, 2, 2, 2]);
        assert!(editor.can_undo());
    }

    #[tokio::test]
    async fn test_empty_bands_never_reach_backend() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        let mut config = config();
        config.segmentation.ai_model.bands = Some(vec![]);

        let error = workspace.save_preferences(&backend, config).await.unwrap_err();
        assert_eq!(error.to_string(), "[Segmentation] Need at least one band as input!");
        assert_eq!(backend.config_saves.load(Ordering::SeqCst), 0);
        let notices = workspace.drain_notices();
        assert_eq!(notices[0].message, "[Segmentation] Need at least one band as input!");
        assert_eq!(notices[0].duration, DEFAULT_NOTICE_DURATION);
    }

    #[tokio::test]
    async fn test_save_preferences() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        let preferences = workspace.load_preferences(&backend).await.unwrap();
        let mut config = preferences.config;
        config.segmentation.ai_model.include_bands(&["B2".to_string()]);

        workspace.save_preferences(&backend, config).await.unwrap();
        assert_eq!(backend.config_saves.load(Ordering::SeqCst), 1);
        assert_eq!(workspace.config().segmentation.ai_model.bands(), &["B1", "B2"]);
    }

    #[tokio::test]
    async fn test_forbidden_flags_auth() {
        let backend = FakeBackend {
            forbidden: true,
            ..FakeBackend::new()
        };
        let mut workspace = workspace();
        assert_eq!(workspace.load_image(&backend, "a").await, LoadOutcome::Failed);
        assert!(workspace.auth_required());
        let notices = workspace.drain_notices();
        assert_eq!(notices[0].message, "Unable to load image: HTTP 403: Forbidden");
        assert_eq!(notices[0].level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_refresh_user() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        workspace.refresh_user(&backend).await.unwrap();
        assert_eq!(workspace.user().unwrap().name, "ada");
    }

    #[tokio::test]
    async fn test_local_commands() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        workspace.load_image(&backend, "a").await;

        assert!(workspace.handle_command(WorkspaceCommand::ToolEraser));
        assert_eq!(workspace.tool(), Tool::Eraser);
        assert!(workspace.handle_command(WorkspaceCommand::MaskErrors));
        assert_eq!(workspace.display_mode(), DisplayMode::Errors);

        workspace.handle_command(WorkspaceCommand::BrightnessUp);
        workspace.handle_command(WorkspaceCommand::SaturationDown);
        assert_eq!(workspace.filters().brightness(), 110);
        assert_eq!(workspace.filters().saturation(), 50);
        workspace.handle_command(WorkspaceCommand::ResetFilters);
        assert_eq!(workspace.filters(), &ViewFilters::default());

        assert_eq!(workspace.view_group(), Some("default"));
        workspace.handle_command(WorkspaceCommand::NextViewGroup);
        assert_eq!(workspace.view_group(), Some("radar"));
        workspace.handle_command(WorkspaceCommand::NextViewGroup);
        assert_eq!(workspace.view_group(), Some("default"));

        assert!(workspace.overlay().is_some());
        workspace.handle_command(WorkspaceCommand::ToggleMask);
        assert!(workspace.overlay().is_none());

        assert!(!workspace.handle_command(WorkspaceCommand::NextImage));
        assert!(!workspace.select_class(3));
    }

    #[tokio::test]
    async fn test_stroke_undo_via_command() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        workspace.load_image(&backend, "a").await;
        workspace.set_tool(Tool::Draw);
        workspace.select_class(2);
        workspace.stroke_at(PixelPoint::new(0, 0));
        workspace.stroke_at(PixelPoint::new(1, 1));
        assert!(workspace.end_stroke());
        assert_eq!(workspace.editor().unwrap().history().len(), 2);

        assert!(workspace.handle_command(WorkspaceCommand::Undo));
        assert_eq!(workspace.editor().unwrap().stats().total, 0);
        assert!(workspace.handle_command(WorkspaceCommand::Redo));
        assert_eq!(workspace.editor().unwrap().stats().class_counts[2], 4);
    }

    #[tokio::test]
    async fn test_navigation_after_reset_is_not_blocked() {
        let backend = FakeBackend::new();
        let mut workspace = workspace();
        workspace.load_image(&backend, "a").await;
        assert!(workspace.handle_command(WorkspaceCommand::ResetMask));
        assert!(workspace.editor().unwrap().is_dirty());

        assert_eq!(workspace.next_image(&backend).await.unwrap(), LoadOutcome::Applied);
        assert_eq!(workspace.image_id(), Some("b"));
        assert_eq!(backend.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drag_joins_pointer_samples() {
        let backend = FakeBackend::new();
        let mut config = config();
        config.segmentation.mask_shape = MaskShape(8, 1);
        let mut workspace = SegmentationWorkspace::new(config);
        workspace.load_image(&backend, "a").await;
        workspace.set_tool(Tool::Draw);
        workspace.set_brush_size(1);

        workspace.stroke_at(PixelPoint::new(0, 0));
        workspace.stroke_at(PixelPoint::new(7, 0));
        assert_eq!(workspace.editor().unwrap().buffers().user(), &[1; 8]);
        assert!(workspace.end_stroke());

        // A new stroke starts without joining to the last one
        workspace.set_tool(Tool::Eraser);
        workspace.set_eraser_size(1);
        workspace.stroke_at(PixelPoint::new(2, 0));
        workspace.end_stroke();
        workspace.stroke_at(PixelPoint::new(5, 0));
        workspace.end_stroke();
        assert_eq!(
            workspace.editor().unwrap().buffers().user(),
            &[1, 1, 0, 1, 1, 0, 1, 1]
        );
    }

    #[test]
    fn test_notices_expire() {
        let mut workspace = workspace();
        workspace.notify(Notice::info("short").with_duration(Duration::from_millis(500)));
        workspace.notify(Notice::error("long"));
        assert_eq!(workspace.notices().count(), 2);

        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(workspace.expire_notices(later), 1);
        let remaining: Vec<&str> = workspace.notices().map(|n| n.message.as_str()).collect();
        assert_eq!(remaining, vec!["long"]);

        let much_later = Instant::now() + DEFAULT_NOTICE_DURATION * 2;
        assert_eq!(workspace.expire_notices(much_later), 1);
        assert!(workspace.drain_notices().is_empty());
    }
}
