//! Renderers consume complete view trees.

use std::io::Write;

use super::view::VNode;
use crate::error::RenderError;

/// Something that displays view trees.
///
/// Every call receives a complete tree. Working out what changed since the
/// previous one is up to the renderer.
pub trait Renderer {
    fn render(&mut self, view: &VNode) -> Result<(), RenderError>;
}

/// Keeps every rendered tree.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    frames: Vec<VNode>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[VNode] {
        &self.frames
    }

    pub fn last(&self) -> Option<&VNode> {
        self.frames.last()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, view: &VNode) -> Result<(), RenderError> {
        self.frames.push(view.clone());
        Ok(())
    }
}

/// Writes each tree as a MessagePack frame with a big-endian `u32` length
/// prefix.
#[derive(Debug)]
pub struct FrameRenderer<W> {
    writer: W,
    frames: u64,
}

impl<W: Write> FrameRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, frames: 0 }
    }

    /// Number of frames written.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Renderer for FrameRenderer<W> {
    fn render(&mut self, view: &VNode) -> Result<(), RenderError> {
        let bytes = rmp_serde::to_vec_named(view)?;
        let len = u32::try_from(bytes.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "view frame too large")
        })?;
        self.writer.write_all(&len.to_be_bytes())?;
        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        self.frames += 1;
        Ok(())
    }
}
