//! ThumbnailerActor - sequential preview pipeline.
//!
//! Renders one preview per image-typed staged file, exactly once per
//! distinct content key, without blocking adds/removals/edits. Renders run
//! strictly one at a time with a cooperative pause between them, and each
//! result is published into the table immediately so readers see previews
//! arrive incrementally. A failed render only skips that file.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::ImageFormat;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};

use crate::file::StagedFile;
use crate::services::{RenderedThumbnail, ThumbnailError, ThumbnailRenderer};

#[derive(Debug)]
pub enum ThumbnailerMsg {
    /// Queue files for rendering; non-images and already-processed keys are
    /// filtered out.
    Enqueue { files: Vec<StagedFile> },

    /// Internal: render the next queued file, then re-schedule after the
    /// cooperative pause.
    ProcessNext,

    /// Drop table entries whose key no longer has a live record. The
    /// processed set is kept, so re-adding identical content does not
    /// re-render.
    Retain { live_keys: HashSet<String> },

    /// Content key -> rendered preview, as published so far.
    GetTable {
        reply: RpcReplyPort<HashMap<String, RenderedThumbnail>>,
    },
}

pub struct ThumbnailerArguments {
    pub renderer: Arc<dyn ThumbnailRenderer>,
    pub pause: Duration,
}

pub struct ThumbnailerState {
    renderer: Arc<dyn ThumbnailRenderer>,
    pause: Duration,
    queue: VecDeque<StagedFile>,
    processed: HashSet<String>,
    table: HashMap<String, RenderedThumbnail>,
    draining: bool,
}

#[derive(Debug, Default)]
pub struct ThumbnailerActor;

#[async_trait]
impl Actor for ThumbnailerActor {
    type Msg = ThumbnailerMsg;
    type State = ThumbnailerState;
    type Arguments = ThumbnailerArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!(actor_id = %myself.get_id(), "ThumbnailerActor starting");

        Ok(ThumbnailerState {
            renderer: args.renderer,
            pause: args.pause,
            queue: VecDeque::new(),
            processed: HashSet::new(),
            table: HashMap::new(),
            draining: false,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ThumbnailerMsg::Enqueue { files } => {
                for file in files {
                    if !file.is_image()
                        || state.processed.contains(file.key())
                        || state.queue.iter().any(|queued| queued.key() == file.key())
                    {
                        continue;
                    }
                    state.queue.push_back(file);
                }

                if !state.draining && !state.queue.is_empty() {
                    state.draining = true;
                    let _ = myself.send_message(ThumbnailerMsg::ProcessNext);
                }
            }

            ThumbnailerMsg::ProcessNext => {
                let Some(file) = state.queue.pop_front() else {
                    state.draining = false;
                    return Ok(());
                };

                state.processed.insert(file.key().to_string());
                match state.renderer.render(&file) {
                    Ok(thumbnail) => {
                        tracing::debug!(file = %file.name(), "rendered preview");
                        state.table.insert(file.key().to_string(), thumbnail);
                    }
                    Err(err) => {
                        // Per-file failure; the queue keeps draining.
                        tracing::warn!(error = %err, file = %file.name(), "preview render failed");
                    }
                }

                // Cooperative pause before the next render, scheduled outside
                // the mailbox so queued messages interleave.
                let myself = myself.clone();
                let pause = state.pause;
                tokio::spawn(async move {
                    tokio::time::sleep(pause).await;
                    let _ = myself.send_message(ThumbnailerMsg::ProcessNext);
                });
            }

            ThumbnailerMsg::Retain { live_keys } => {
                state.table.retain(|key, _| live_keys.contains(key));
            }

            ThumbnailerMsg::GetTable { reply } => {
                let _ = reply.send(state.table.clone());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::debug!(actor_id = %myself.get_id(), "ThumbnailerActor stopped");
        Ok(())
    }
}

// ============================================================================
// Default renderer
// ============================================================================

/// Default [`ThumbnailRenderer`]: decode with the image crate, resize into a
/// bounded square, re-encode as JPEG and expose as a base64 data URL.
pub struct ImageRenderer {
    size: u32,
}

impl ImageRenderer {
    pub fn new(size: u32) -> Self {
        Self { size }
    }
}

impl ThumbnailRenderer for ImageRenderer {
    fn render(&self, file: &StagedFile) -> Result<RenderedThumbnail, ThumbnailError> {
        if !file.is_image() {
            return Err(ThumbnailError::UnsupportedType(
                file.content_type().to_string(),
            ));
        }

        let decoded = image::load_from_memory(file.data())
            .map_err(|e| ThumbnailError::Decode(e.to_string()))?;
        let resized = decoded.resize(self.size, self.size, FilterType::Lanczos3);

        // JPEG has no alpha channel; flatten before encoding.
        let mut encoded = Vec::new();
        resized
            .to_rgb8()
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)
            .map_err(|e| ThumbnailError::Encode(e.to_string()))?;

        Ok(RenderedThumbnail {
            data_url: format!("data:image/jpeg;base64,{}", STANDARD.encode(&encoded)),
        })
    }
}
