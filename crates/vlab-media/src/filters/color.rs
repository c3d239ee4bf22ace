use super::ParamReader;
use crate::error::MediaResult;
use crate::frame::Frame;

/// Luma conversion expanded back to three equal channels.
pub fn gray_scale(frame: &Frame, _params: &ParamReader<'_>) -> MediaResult<Frame> {
    Ok(Frame::from_gray(&frame.to_gray()))
}
