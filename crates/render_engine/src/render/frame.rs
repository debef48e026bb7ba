//! Frame slot rotation and per-slot synchronization
//!
//! The renderer keeps a fixed number of frames in flight. Each slot owns
//! the CPU-side resources one frame needs (sync objects, command buffer,
//! per-slot uniform buffers); the schedule decides which slot the next
//! frame uses.

use ash::Device;

use crate::render::context::VulkanResult;
use crate::render::sync::{FrameSync, Semaphore};

/// Number of frames the CPU may record ahead of the GPU.
///
/// Two keeps the CPU one frame ahead without the latency cost of three.
/// All per-slot resource arrays are sized by this constant.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Pure frame-slot rotation state.
///
/// Separated from the GPU objects so the rotation arithmetic is testable
/// on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameSchedule {
    current: usize,
    waits: u64,
}

impl FrameSchedule {
    /// Start the schedule at slot zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot the frame being recorded right now uses
    pub fn current(&self) -> usize {
        self.current
    }

    /// Count one fence wait.
    ///
    /// Every frame attempt waits exactly once, including frames later
    /// abandoned on a stale acquire.
    pub fn record_wait(&mut self) {
        self.waits += 1;
    }

    /// Fence waits performed since construction
    pub fn wait_count(&self) -> u64 {
        self.waits
    }

    /// Slot the previous frame used.
    ///
    /// The particle effect reads last frame's output buffer, which lives
    /// in this slot.
    pub fn previous(&self) -> usize {
        (self.current + MAX_FRAMES_IN_FLIGHT - 1) % MAX_FRAMES_IN_FLIGHT
    }

    /// Advance to the next slot.
    ///
    /// Called exactly once per completed frame, after submission. Frames
    /// that end early (stale surface, zero-extent window) do not advance,
    /// so the retry reuses the same slot.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % MAX_FRAMES_IN_FLIGHT;
    }
}

/// Owns all frame-level synchronization objects.
///
/// Per-slot: the image-available semaphore and in-flight fence bundled in
/// [`FrameSync`]. Per-image: the render-finished semaphores, because the
/// present engine releases them per swapchain image, not per slot, and
/// the swapchain may deliver more images than there are slots.
pub struct FrameSyncController {
    device: Device,
    frames: Vec<FrameSync>,
    render_finished: Vec<Semaphore>,
    schedule: FrameSchedule,
}

impl FrameSyncController {
    /// Create sync objects for every slot and every swapchain image
    pub fn new(device: Device, image_count: usize) -> VulkanResult<Self> {
        let frames = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;
        let render_finished = (0..image_count)
            .map(|_| Semaphore::new(device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self {
            device,
            frames,
            render_finished,
            schedule: FrameSchedule::new(),
        })
    }

    /// Sync bundle for the current slot
    pub fn current_frame(&self) -> &FrameSync {
        &self.frames[self.schedule.current()]
    }

    /// Block until the current slot's previous submission has finished,
    /// counting the wait
    pub fn wait_current(&mut self, timeout: u64) -> VulkanResult<()> {
        self.frames[self.schedule.current()].in_flight.wait(timeout)?;
        self.schedule.record_wait();
        Ok(())
    }

    /// Fence waits performed since construction
    pub fn fence_wait_count(&self) -> u64 {
        self.schedule.wait_count()
    }

    /// Current slot index, for indexing per-slot resources elsewhere
    pub fn current_slot(&self) -> usize {
        self.schedule.current()
    }

    /// Previous slot index
    pub fn previous_slot(&self) -> usize {
        self.schedule.previous()
    }

    /// Render-finished semaphore for the given swapchain image
    pub fn render_finished(&self, image_index: u32) -> &Semaphore {
        &self.render_finished[image_index as usize]
    }

    /// Advance the schedule after a successful submission
    pub fn advance(&mut self) {
        self.schedule.advance();
    }

    /// Resize the per-image semaphore set after a swapchain rebuild.
    ///
    /// Only called with the device idle, so dropping the old semaphores
    /// is safe even if the retired swapchain still referenced them.
    pub fn reset_image_semaphores(&mut self, image_count: usize) -> VulkanResult<()> {
        self.render_finished = (0..image_count)
            .map(|_| Semaphore::new(self.device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_rotates_through_all_slots() {
        let mut schedule = FrameSchedule::new();
        assert_eq!(schedule.current(), 0);

        schedule.advance();
        assert_eq!(schedule.current(), 1);

        schedule.advance();
        assert_eq!(schedule.current(), 0);
    }

    #[test]
    fn previous_slot_wraps_at_zero() {
        let schedule = FrameSchedule::new();
        assert_eq!(schedule.previous(), MAX_FRAMES_IN_FLIGHT - 1);

        let mut schedule = FrameSchedule::new();
        schedule.advance();
        assert_eq!(schedule.previous(), 0);
    }

    #[test]
    fn five_clean_frames_count_five_waits() {
        let mut schedule = FrameSchedule::new();
        for _ in 0..5 {
            schedule.record_wait();
            schedule.advance();
        }
        assert_eq!(schedule.wait_count(), 5);
        assert_eq!(schedule.current(), 5 % MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn abandoned_frame_still_counts_its_wait() {
        // A stale acquire ends the frame after the wait but before the
        // advance; the wait happened and must be counted.
        let mut schedule = FrameSchedule::new();
        schedule.record_wait();
        // no advance here
        assert_eq!(schedule.wait_count(), 1);
        assert_eq!(schedule.current(), 0);
    }

    #[test]
    fn abandoned_frame_reuses_its_slot() {
        // A stale acquire ends the frame without advancing; the next
        // attempt must land on the same slot.
        let mut schedule = FrameSchedule::new();
        schedule.advance();
        let before = schedule.current();
        // no advance here
        assert_eq!(schedule.current(), before);
    }
}
