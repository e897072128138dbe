/// Periodic audio callback: must be realtime-safe.
///
/// The host calls this with a fixed block size and expects both slices to be
/// fully written before it returns.
pub trait RenderCallback: Send {
    fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32]);
}
