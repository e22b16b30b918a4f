//! Single in-flight frame synchronization.

use super::GpuDevice;
use crate::error::RenderError;

/// The fence and two semaphores guarding the one frame in flight.
///
/// - `in_flight`: signaled when the GPU is done with the last submission;
///   created signaled so the first frame does not block
/// - `image_available`: signaled by acquire, waited on by submit
/// - `render_finished`: signaled by submit, waited on by present
pub struct FrameSync<D: GpuDevice> {
    pub in_flight: D::Fence,
    pub image_available: D::Semaphore,
    pub render_finished: D::Semaphore,
}

impl<D: GpuDevice> FrameSync<D> {
    pub fn new(device: &mut D) -> Result<Self, RenderError> {
        let in_flight = device.create_fence(true)?;
        let image_available = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_fence(in_flight);
                return Err(e);
            }
        };
        let render_finished = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(image_available);
                device.destroy_fence(in_flight);
                return Err(e);
            }
        };
        Ok(Self {
            in_flight,
            image_available,
            render_finished,
        })
    }

    /// Replace all three objects with fresh ones.
    ///
    /// Used after an aborted frame, which leaves the fence reset with no
    /// submission to signal it and may leave `image_available` signaled.
    /// The device must be idle.
    pub fn rebuild(&mut self, device: &mut D) -> Result<(), RenderError> {
        let fresh = Self::new(device)?;
        std::mem::replace(self, fresh).destroy(device);
        Ok(())
    }

    pub fn destroy(self, device: &mut D) {
        device.destroy_semaphore(self.render_finished);
        device.destroy_semaphore(self.image_available);
        device.destroy_fence(self.in_flight);
    }
}
