use ash::vk;
use lantern_gfx::{AcquireResult, PresentResult};

use crate::backend::RenderBackend;
use crate::error::RenderResult;
use crate::frame::{FrameCounter, FrameLabel};
use crate::scene::{Camera, Scene};
use crate::settings::RenderSettings;

/// Everything a renderer needs to know about the frame being recorded.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    pub slot: FrameLabel,
    pub image_index: u32,
    pub frame_id: u64,
}

/// One pass over the scene. The context calls registered renderers in
/// registration order, inside an open recording.
pub trait SceneRenderer<B: RenderBackend> {
    fn render(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        camera: &Camera,
        slot: FrameLabel,
    ) -> RenderResult<()>;

    /// Give back GPU objects. Called once, after the device is idle.
    fn release(&mut self, backend: &mut B);
}

/// Owns the frame loop: slot rotation, staleness recovery and renderer
/// dispatch. Holds the backend; everyone else borrows it through here.
pub struct RenderContext<B: RenderBackend> {
    backend: B,
    counter: FrameCounter,
    renderers: Vec<Box<dyn SceneRenderer<B>>>,
    settings: RenderSettings,
    framebuffer_resized: bool,
    in_flight: Option<(FrameLabel, u32)>,
}

impl<B: RenderBackend> RenderContext<B> {
    pub fn new(backend: B, settings: RenderSettings) -> Self {
        let counter = FrameCounter::new(backend.frames_in_flight());
        Self {
            backend,
            counter,
            renderers: Vec::new(),
            settings,
            framebuffer_resized: false,
            in_flight: None,
        }
    }

    pub fn add_renderer(&mut self, renderer: Box<dyn SceneRenderer<B>>) {
        self.renderers.push(renderer);
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.counter.frame_id()
    }

    #[inline]
    pub fn current_slot(&self) -> FrameLabel {
        self.counter.current()
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.counter.frames_in_flight()
    }

    /// The windowing layer calls this when the framebuffer size changed;
    /// the swapchain is rebuilt after the next present.
    pub fn set_framebuffer_resized(&mut self) {
        self.framebuffer_resized = true;
    }

    /// Wait for the current slot, acquire an image and open recording.
    ///
    /// Returns `None` when the swapchain was stale: it has been rebuilt and
    /// the frame is skipped without advancing the slot, so the retry reuses
    /// the same synchronization objects.
    pub fn begin_frame(&mut self) -> RenderResult<Option<FrameInfo>> {
        assert!(self.in_flight.is_none(), "begin_frame while a frame is open");
        let slot = self.counter.current();
        self.backend.wait_slot(slot)?;

        match self.backend.acquire_image(slot)? {
            AcquireResult::OutOfDate => {
                log::debug!("acquire out of date on slot {slot}, rebuilding swapchain");
                self.recreate_swapchain()?;
                Ok(None)
            }
            AcquireResult::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    // usable this frame; rebuild after present
                    self.framebuffer_resized = true;
                }
                self.backend
                    .begin_recording(slot, image_index, self.settings.clear_color)?;
                self.in_flight = Some((slot, image_index));
                Ok(Some(FrameInfo {
                    slot,
                    image_index,
                    frame_id: self.counter.frame_id(),
                }))
            }
        }
    }

    /// Close recording, submit and present. The slot advances only when the
    /// present actually went through against a fresh swapchain.
    pub fn end_frame(&mut self) -> RenderResult<()> {
        let (slot, image_index) = self.in_flight.take().expect("end_frame without begin_frame");
        self.backend.submit(slot, image_index)?;

        let stale = matches!(self.backend.present(slot, image_index)?, PresentResult::Stale);
        if stale || self.framebuffer_resized {
            self.framebuffer_resized = false;
            log::debug!("present stale on slot {slot}, rebuilding swapchain");
            self.recreate_swapchain()?;
            return Ok(());
        }

        self.counter.advance();
        Ok(())
    }

    /// One complete frame: begin, run every registered renderer in order,
    /// end. Returns whether anything was drawn (false means the swapchain
    /// was stale and the frame was skipped).
    pub fn render(&mut self, scene: &Scene, camera: &Camera) -> RenderResult<bool> {
        let Some(frame) = self.begin_frame()? else {
            return Ok(false);
        };

        // take the renderer list so they can borrow the backend mutably
        let mut renderers = std::mem::take(&mut self.renderers);
        let mut result = Ok(());
        for renderer in &mut renderers {
            result = renderer.render(&mut self.backend, scene, camera, frame.slot);
            if result.is_err() {
                break;
            }
        }
        self.renderers = renderers;
        result?;

        self.end_frame()?;
        Ok(true)
    }

    /// Rebuild the swapchain at the window's current drawable size. Blocks,
    /// polling events, while the drawable size is zero; recreation with a
    /// zero extent is never attempted.
    pub fn recreate_swapchain(&mut self) -> RenderResult<()> {
        let mut extent = self.backend.drawable_extent();
        while extent.width == 0 || extent.height == 0 {
            self.backend.pump_events();
            extent = self.backend.drawable_extent();
        }
        self.backend.wait_idle();
        self.backend.recreate_swapchain(extent)?;
        log::info!("swapchain rebuilt at {}x{}", extent.width, extent.height);
        Ok(())
    }

    #[inline]
    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.backend.swapchain_extent()
    }

    /// Idle the device and let every renderer give back its GPU objects.
    /// Call before dropping the context.
    pub fn shutdown(&mut self) {
        self.backend.wait_idle();
        let mut renderers = std::mem::take(&mut self.renderers);
        for renderer in &mut renderers {
            renderer.release(&mut self.backend);
        }
    }
}
