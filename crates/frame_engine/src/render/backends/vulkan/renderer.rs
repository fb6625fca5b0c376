//! Vulkan renderer lifecycle
//!
//! [`VulkanRenderer`] exposes the three lifecycle operations of the render core:
//! [`VulkanRenderer::initialize`], [`VulkanRenderer::update`] and
//! [`VulkanRenderer::shutdown`]. The per-frame state machine lives in
//! [`FrameScheduler`]; this module supplies the GPU side of it and owns every
//! device-level object.

use std::path::Path;
use std::time::Duration;

use ash::vk;

use crate::assets::ImageData;
use crate::core::config::RendererConfig;
use crate::render::backends::vulkan::initialization::device_selection::SurfaceSupport;
use crate::render::backends::vulkan::rendering::commands::{record_quad_draws, CommandPool, QuadDraw};
use crate::render::backends::vulkan::rendering::shader::ShaderCode;
use crate::render::backends::vulkan::rendering::vertex_layout::{QUAD_INDICES, QUAD_VERTICES};
use crate::render::backends::vulkan::resources::resource_manager::{check_texture_limit, ResourceManager};
use crate::render::backends::vulkan::resources::texture::Texture;
use crate::render::backends::vulkan::resources::texture_registry::{read_file, TextureRegistry};
use crate::render::backends::vulkan::resources::uniform::UniformBufferObject;
use crate::render::backends::vulkan::resources::upload::UploadContext;
use crate::render::backends::vulkan::state::frame_scheduler::{
    AcquireOutcome, FrameBackend, FrameScheduler, FrameStatus, PresentOutcome,
};
use crate::render::backends::vulkan::state::swapchain::{choose_extent, is_zero_area, SwapchainState};
use crate::render::backends::vulkan::state::sync::FrameSync;
use crate::render::backends::vulkan::state::teardown::{run_teardown, Teardown, TeardownStep};
use crate::render::backends::vulkan::{
    ResizeSignal, StepContext, SurfaceProvider, VulkanContext, VulkanError, VulkanResult,
};

#[derive(Debug, Clone, Copy)]
struct RendererSettings {
    frames_in_flight: usize,
    idle_timeout: Duration,
    idle_timeout_ns: u64,
    max_textures: u32,
}

impl RendererSettings {
    fn from_config(config: &RendererConfig) -> Self {
        Self {
            frames_in_flight: config.max_frames_in_flight.max(1),
            idle_timeout: Duration::from_millis(config.idle_timeout_ms),
            idle_timeout_ns: config.idle_timeout_ns(),
            max_textures: config.max_textures,
        }
    }
}

/// Everything the renderer owns
///
/// Field order is the teardown order, so a plain drop releases objects in the
/// same sequence as [`run_teardown`].
struct RendererState {
    settings: RendererSettings,
    shaders: ShaderCode,
    resize: ResizeSignal,
    drawable: (u32, u32),
    elapsed: f32,
    torn_down: bool,
    // Recorded commands may use descriptor sets that no longer match the registry
    bindings_stale: bool,

    // Frame slot that last submitted work drawing into each swapchain image
    images_in_flight: Vec<Option<usize>>,
    frame_slots: Vec<FrameSync>,
    command_buffers: Vec<vk::CommandBuffer>,
    commands: Option<CommandPool>,
    resources: ResourceManager,
    textures: TextureRegistry,
    // Textures that stale bindings may still reference
    retired: Vec<Texture>,
    swapchain: Option<SwapchainState>,
    context: VulkanContext,
}

fn unavailable(what: &str) -> VulkanError {
    VulkanError::InvalidOperation {
        reason: format!("The {what} is not available"),
    }
}

fn upload_context<'a>(context: &'a VulkanContext, commands: Option<&'a CommandPool>) -> VulkanResult<UploadContext<'a>> {
    Ok(UploadContext {
        device: context.device(),
        memory_properties: context.memory_properties(),
        command_pool: commands.ok_or_else(|| unavailable("command pool"))?,
        queue: context.graphics_queue(),
        anisotropy: context.logical_device().anisotropy_enabled(),
    })
}

impl RendererState {
    fn populate(&mut self) -> VulkanResult<bool> {
        let graphics_family = self.context.adapter().queue_families.graphics;
        self.commands = Some(CommandPool::new(self.context.device().clone(), graphics_family).step("create command pool")?);
        self.frame_slots =
            FrameSync::create_slots(self.context.device(), self.settings.frames_in_flight).step("create frame slots")?;

        let upload = upload_context(&self.context, self.commands.as_ref())?;
        self.resources
            .upload_geometry(&upload, &QUAD_VERTICES, &QUAD_INDICES)
            .step("upload quad geometry")?;
        self.upload_pending_textures().step("upload queued textures")?;

        self.rebuild_swapchain().step("build swapchain")
    }

    fn upload_pending_textures(&mut self) -> VulkanResult<()> {
        let pending = self.textures.take_pending();
        if pending.is_empty() {
            return Ok(());
        }

        let upload = upload_context(&self.context, self.commands.as_ref())?;
        let count = pending.len();
        for (url, pixels) in pending {
            if !self.textures.contains(&url) {
                check_texture_limit(self.textures.len() + 1, self.settings.max_textures)?;
            }
            let texture = Texture::upload(&upload, &pixels)?;
            log::debug!("Uploaded queued texture '{}'", url);
            self.textures.insert(url, texture);
        }
        log::info!("Uploaded {} queued texture(s)", count);
        Ok(())
    }

    fn frame_slot(&self, slot: usize) -> VulkanResult<&FrameSync> {
        self.frame_slots
            .get(slot)
            .ok_or_else(|| unavailable(&format!("frame slot {slot}")))
    }

    fn swapchain(&self) -> VulkanResult<&SwapchainState> {
        self.swapchain.as_ref().ok_or_else(|| unavailable("swapchain"))
    }

    fn in_flight_fences(&self) -> Vec<vk::Fence> {
        self.frame_slots.iter().map(|slot| slot.in_flight.handle()).collect()
    }

    /// Bounded wait for every slot's submission, then for the whole device
    fn wait_idle(&self) -> VulkanResult<()> {
        self.context
            .wait_idle_bounded(&self.in_flight_fences(), self.settings.idle_timeout)
    }

    /// Rewrite descriptor sets and command buffers for the current swapchain and textures
    ///
    /// Nothing may be executing on the GPU when this runs.
    fn refresh_bindings(&mut self) -> VulkanResult<()> {
        let Some(image_count) = self.swapchain.as_ref().map(SwapchainState::image_count) else {
            // Deferred rebuild; the next successful build writes everything
            return Ok(());
        };

        self.resources.ensure_uniform_buffers(image_count)?;
        self.resources.rebuild_descriptor_sets(&self.textures)?;
        self.record_commands()?;
        self.images_in_flight = vec![None; image_count];
        self.bindings_stale = false;
        self.retired.clear();
        Ok(())
    }

    /// Put the registry back the way it was before a failed change to `url` and
    /// rebind it
    ///
    /// If rebinding fails too, the displaced texture is kept alive and the
    /// bindings are marked stale so the next frame rebuilds them.
    fn roll_back_texture_change(&mut self, url: &str, previous: Option<Texture>) {
        let displaced = self.textures.restore(url, previous);
        match self.refresh_bindings() {
            Ok(()) => log::warn!("Rolled back texture change for '{}'", url),
            Err(e) => {
                log::error!("Could not rebind textures after a failed change to '{}': {}", url, e);
                self.bindings_stale = true;
                self.retired.extend(displaced);
            }
        }
    }

    fn record_commands(&mut self) -> VulkanResult<()> {
        let swapchain = self.swapchain.as_ref().ok_or_else(|| unavailable("swapchain"))?;
        let commands = self.commands.as_ref().ok_or_else(|| unavailable("command pool"))?;

        let image_count = swapchain.image_count();
        if self.command_buffers.len() != image_count {
            commands.free_command_buffers(&self.command_buffers);
            self.command_buffers.clear();
            let count = u32::try_from(image_count).map_err(|_| VulkanError::InvalidOperation {
                reason: format!("{image_count} swapchain images"),
            })?;
            self.command_buffers = commands.allocate_command_buffers(count)?;
        }

        let draw = QuadDraw {
            render_pass: swapchain.render_pass(),
            pipeline: swapchain.pipeline(),
            pipeline_layout: swapchain.pipeline_layout(),
            extent: swapchain.extent(),
            vertex_buffer: self.resources.vertex_buffer()?,
            index_buffer: self.resources.index_buffer()?,
            index_count: self.resources.index_count(),
        };

        record_quad_draws(
            self.context.device(),
            &self.command_buffers,
            &swapchain.framebuffers(),
            self.resources.descriptor_sets(),
            &draw,
        )
    }

    fn add_texture(&mut self, url: String, pixels: &ImageData) -> VulkanResult<usize> {
        if !self.textures.contains(&url) {
            check_texture_limit(self.textures.len() + 1, self.settings.max_textures)?;
        }

        let upload = upload_context(&self.context, self.commands.as_ref())?;
        let texture = Texture::upload(&upload, pixels)?;

        self.wait_idle()?;
        let replaced = self.textures.insert(url.clone(), texture);
        if let Err(e) = self.refresh_bindings() {
            self.roll_back_texture_change(&url, replaced);
            return Err(e);
        }
        drop(replaced);

        log::info!("Loaded texture '{}' ({} loaded)", url, self.textures.len());
        self.textures.index_of(&url).ok_or(VulkanError::ResourceNotFound(url))
    }

    fn remove_texture(&mut self, url: &str) -> VulkanResult<()> {
        if !self.textures.contains(url) {
            return Err(VulkanError::ResourceNotFound(url.to_string()));
        }

        self.wait_idle()?;
        let removed = self.textures.remove(url)?;
        if let Err(e) = self.refresh_bindings() {
            self.roll_back_texture_change(url, Some(removed));
            return Err(e);
        }
        drop(removed);

        log::info!("Unloaded texture '{}' ({} loaded)", url, self.textures.len());
        Ok(())
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        run_teardown(self);
        self.torn_down = true;
        log::info!("Renderer shut down");
    }
}

impl FrameBackend for RendererState {
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.frame_slot(slot)?.in_flight.wait(self.settings.idle_timeout_ns)
    }

    fn rebuild_swapchain(&mut self) -> VulkanResult<bool> {
        self.wait_idle()?;

        let adapter = self.context.adapter();
        let support = SurfaceSupport::query(
            self.context.surface_loader(),
            adapter.physical_device,
            self.context.surface(),
        )?;

        // Only used when the surface leaves the extent to us
        if let Some(drawable) = self.resize.drawable_size() {
            self.drawable = drawable;
        }
        let extent = choose_extent(&support.capabilities, self.drawable);
        if is_zero_area(extent) {
            log::debug!("Surface has zero area, deferring swapchain rebuild");
            return Ok(false);
        }

        // Never patched in place: the old chain is gone before the new one is built
        self.swapchain = None;
        let swapchain = SwapchainState::build(
            &self.context,
            &support,
            extent,
            &self.shaders,
            self.resources.set_layout()?,
        )?;
        self.swapchain = Some(swapchain);

        self.refresh_bindings()?;
        Ok(true)
    }

    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome> {
        let Some(swapchain) = self.swapchain.as_ref() else {
            return Ok(AcquireOutcome::OutOfDate);
        };
        swapchain.acquire_next_image(self.frame_slot(slot)?.image_available.handle())
    }

    fn update_uniforms(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let image = image_index as usize;
        if let Some(owner) = self.images_in_flight.get(image).copied().flatten() {
            if owner != slot {
                self.frame_slot(owner)?.in_flight.wait(self.settings.idle_timeout_ns)?;
            }
        }
        if let Some(entry) = self.images_in_flight.get_mut(image) {
            *entry = Some(slot);
        }

        let ubo = UniformBufferObject::spinning_quad(self.elapsed, self.swapchain()?.extent());
        self.resources.write_uniforms(image_index, &ubo)
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let sync = self.frame_slot(slot)?;
        let command_buffer = self
            .command_buffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| unavailable(&format!("command buffer for image {image_index}")))?;

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [sync.render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        sync.in_flight.reset()?;
        unsafe {
            self.context
                .device()
                .queue_submit(self.context.graphics_queue(), &[submit_info], sync.in_flight.handle())
                .map_err(VulkanError::Api)
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
        let render_finished = self.frame_slot(slot)?.render_finished.handle();
        self.swapchain()?
            .present(self.context.present_queue(), render_finished, image_index)
    }
}

impl Teardown for RendererState {
    fn release(&mut self, step: TeardownStep) {
        match step {
            TeardownStep::WaitIdle => {
                if let Err(e) = self.wait_idle() {
                    log::error!("Device did not go idle before teardown: {}", e);
                }
            }
            TeardownStep::FrameSync => {
                self.images_in_flight.clear();
                self.frame_slots.clear();
            }
            TeardownStep::CommandPool => {
                self.command_buffers.clear();
                self.commands = None;
            }
            TeardownStep::DescriptorPool => self.resources.release_descriptor_pool(),
            TeardownStep::DescriptorSetLayouts => self.resources.release_set_layout(),
            TeardownStep::UniformBuffers => self.resources.release_uniform_buffers(),
            TeardownStep::IndexBuffer => self.resources.release_index_buffer(),
            TeardownStep::VertexBuffer => self.resources.release_vertex_buffer(),
            TeardownStep::Textures => {
                self.retired.clear();
                self.textures.clear();
            }
            TeardownStep::Swapchain => self.swapchain = None,
            TeardownStep::Surface => self.context.destroy_surface(),
            TeardownStep::Device => self.context.destroy_device(),
            TeardownStep::Instance => self.context.destroy_instance(),
        }
    }
}

/// The render core: one presentable image chain, N frames in flight and the
/// resources of the textured quad
pub struct VulkanRenderer {
    scheduler: FrameScheduler,
    state: RendererState,
}

impl VulkanRenderer {
    /// Bring up the whole pipeline
    ///
    /// Images queued on `textures` are uploaded before the first frame; any
    /// failure here is fatal and releases whatever was already created.
    pub fn initialize(
        provider: &mut dyn SurfaceProvider,
        config: &RendererConfig,
        textures: TextureRegistry,
    ) -> VulkanResult<Self> {
        config
            .validate()
            .map_err(VulkanError::InitializationFailed)
            .step("validate configuration")?;
        let shaders = ShaderCode::load(&config.shaders).step("load shaders")?;
        let context = VulkanContext::new(provider, config)?;
        let resources = ResourceManager::new(context.device(), context.memory_properties(), config.max_textures)
            .step("create descriptor set layout")?;

        let settings = RendererSettings::from_config(config);
        let resize = provider.resize_signal();
        let drawable = provider.drawable_size();
        resize.publish_size(drawable.0, drawable.1);
        let mut state = RendererState {
            settings,
            shaders,
            resize: resize.clone(),
            drawable,
            elapsed: 0.0,
            torn_down: false,
            bindings_stale: false,
            images_in_flight: Vec::new(),
            frame_slots: Vec::new(),
            command_buffers: Vec::new(),
            commands: None,
            resources,
            textures,
            retired: Vec::new(),
            swapchain: None,
            context,
        };
        let mut scheduler = FrameScheduler::new(settings.frames_in_flight, resize);

        match state.populate() {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("Surface has zero area at startup, swapchain deferred");
                scheduler.request_rebuild();
            }
            Err(e) => {
                log::error!("Renderer initialization failed: {}", e);
                state.teardown();
                return Err(e);
            }
        }

        log::info!(
            "Renderer initialized on '{}' with {} frame(s) in flight",
            state.context.adapter().name(),
            settings.frames_in_flight
        );
        Ok(Self { scheduler, state })
    }

    /// Advance the clock by `delta_time` seconds and run one frame
    ///
    /// `Err` means the frame failed in a way the renderer cannot recover from;
    /// the error names the step that failed.
    pub fn update(&mut self, delta_time: f32) -> VulkanResult<FrameStatus> {
        self.state.elapsed += delta_time.max(0.0);
        self.scheduler.run_cycle(&mut self.state).map_err(|e| {
            log::error!("Frame {} failed: {}", self.scheduler.frame_count(), e);
            e
        })
    }

    /// Run the teardown sequence
    pub fn shutdown(mut self) {
        self.state.teardown();
    }

    /// Decode `bytes` and upload them as the texture `url`
    ///
    /// Returns the texture's index in the sampler array. Loading an existing url
    /// replaces its texture. On failure nothing that is rendering changes.
    pub fn load_texture(&mut self, url: impl Into<String>, bytes: &[u8]) -> VulkanResult<usize> {
        let url = url.into();
        let pixels = self.state.textures.decode(&url, bytes)?;
        self.load_image(url, &pixels)
    }

    /// Read, decode and upload a texture file, keyed by its path
    pub fn load_texture_file(&mut self, path: impl AsRef<Path>) -> VulkanResult<usize> {
        let (url, bytes) = read_file(path.as_ref())?;
        self.load_texture(url, &bytes)
    }

    /// Upload already decoded RGBA8 pixels as the texture `url`
    pub fn load_image(&mut self, url: impl Into<String>, pixels: &ImageData) -> VulkanResult<usize> {
        let result = self.state.add_texture(url.into(), pixels);
        self.rebuild_if_stale();
        result
    }

    /// Destroy the texture `url`
    pub fn unload_texture(&mut self, url: &str) -> VulkanResult<()> {
        let result = self.state.remove_texture(url);
        self.rebuild_if_stale();
        result
    }

    fn rebuild_if_stale(&mut self) {
        if self.state.bindings_stale {
            self.scheduler.request_rebuild();
        }
    }

    /// Loaded textures
    pub const fn textures(&self) -> &TextureRegistry {
        &self.state.textures
    }

    /// Signal that schedules a swapchain rebuild when raised
    pub fn resize_signal(&self) -> ResizeSignal {
        self.state.resize.clone()
    }

    /// Current swapchain extent, zero while a rebuild is deferred
    pub fn extent(&self) -> vk::Extent2D {
        self.state
            .swapchain
            .as_ref()
            .map_or_else(vk::Extent2D::default, SwapchainState::extent)
    }

    /// Number of swapchain images, zero while a rebuild is deferred
    pub fn image_count(&self) -> usize {
        self.state.swapchain.as_ref().map_or(0, SwapchainState::image_count)
    }

    /// Frames submitted so far
    pub const fn frame_count(&self) -> u64 {
        self.scheduler.frame_count()
    }

    /// Number of frame slots
    pub const fn frames_in_flight(&self) -> usize {
        self.scheduler.frames_in_flight()
    }

    /// Whether a swapchain rebuild is owed
    pub const fn rebuild_pending(&self) -> bool {
        self.scheduler.rebuild_pending()
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        self.state.teardown();
    }
}
