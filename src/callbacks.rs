// src/callbacks.rs
//! Well-known entry points of a DSP program.
//!
//! A program may define any subset of
//!
//! ```text
//! void  prepare(double sampleRate, int blockSize, int numChannels)
//! void  reset()
//! float processSample(float input)
//! void  processFrame(block frame)
//! void  processChannel(block channel, int channelIndex)
//! void  setX(double value)            // parameter "X"
//! ```
//!
//! A function with the right name but another signature is ignored. For
//! each processing mode exactly one callback is chosen by a fixed priority.

use snex_codegen::CompiledObject;
use snex_runtime::{Block, NativeSignature, NativeType};

/// How the host drives the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    /// One call per frame (all channels of one sample).
    Frame,
    /// One call per channel block.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Sample,
    Frame,
    Channel,
    Inactive,
}

impl CallbackKind {
    pub fn name(self) -> &'static str {
        match self {
            CallbackKind::Sample => "Sample",
            CallbackKind::Frame => "Frame",
            CallbackKind::Channel => "Channel",
            CallbackKind::Inactive => "Inactive",
        }
    }
}

type PrepareFn = extern "C" fn(f64, i32, i32);
type ResetFn = extern "C" fn();
type SampleFn = extern "C" fn(f32) -> f32;
type FrameFn = extern "C" fn(*mut Block<'_>);
type ChannelFn = extern "C" fn(*mut Block<'_>, i32);
type ParameterFn = extern "C" fn(f64);

/// A `set<Name>(double)` function.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    function: ParameterFn,
}

/// The callbacks of one compiled object, owning that object so the
/// function pointers cannot outlive the code.
pub struct CallbackCollection {
    object: CompiledObject,
    prepare: Option<PrepareFn>,
    reset: Option<ResetFn>,
    sample: Option<SampleFn>,
    frame: Option<FrameFn>,
    channel: Option<ChannelFn>,
    parameters: Vec<Parameter>,
}

fn lookup(object: &CompiledObject, name: &str, params: &[NativeType], ret: NativeType) -> Option<*const u8> {
    object.get_function(name, &NativeSignature::new(params.to_vec(), ret))
}

impl CallbackCollection {
    pub fn new(object: CompiledObject) -> Self {
        // Safety (all transmutes below): each pointer was looked up with the
        // exact native signature of the function type it becomes.
        let prepare = lookup(
            &object,
            "prepare",
            &[NativeType::Double, NativeType::Int, NativeType::Int],
            NativeType::Void,
        )
        .map(|p| unsafe { std::mem::transmute::<*const u8, PrepareFn>(p) });
        let reset = lookup(&object, "reset", &[], NativeType::Void)
            .map(|p| unsafe { std::mem::transmute::<*const u8, ResetFn>(p) });
        let sample = lookup(&object, "processSample", &[NativeType::Float], NativeType::Float)
            .map(|p| unsafe { std::mem::transmute::<*const u8, SampleFn>(p) });
        let frame = lookup(&object, "processFrame", &[NativeType::Block], NativeType::Void)
            .map(|p| unsafe { std::mem::transmute::<*const u8, FrameFn>(p) });
        let channel = lookup(
            &object,
            "processChannel",
            &[NativeType::Block, NativeType::Int],
            NativeType::Void,
        )
        .map(|p| unsafe { std::mem::transmute::<*const u8, ChannelFn>(p) });

        let setter = NativeSignature::new(vec![NativeType::Double], NativeType::Void);
        let mut parameters = Vec::new();
        for f in object.functions() {
            let Some(name) = f.name.strip_prefix("set") else { continue };
            if name.is_empty() || f.signature.as_ref() != Some(&setter) {
                continue;
            }
            if let Some(ptr) = object.get_function(&f.name, &setter) {
                parameters.push(Parameter {
                    name: name.to_string(),
                    function: unsafe { std::mem::transmute::<*const u8, ParameterFn>(ptr) },
                });
            }
        }

        let collection = Self {
            object,
            prepare,
            reset,
            sample,
            frame,
            channel,
            parameters,
        };
        tracing::debug!(
            frame_mode = collection.best_callback_name(ProcessMode::Frame),
            block_mode = collection.best_callback_name(ProcessMode::Block),
            parameters = collection.parameters.len(),
            "callbacks set up"
        );
        collection
    }

    pub fn object(&self) -> &CompiledObject {
        &self.object
    }

    /// Callback used for `mode`. Frame processing prefers Frame, then
    /// Sample, then Channel; block processing prefers Channel, then Frame,
    /// then Sample.
    pub fn best_callback(&self, mode: ProcessMode) -> CallbackKind {
        let order = match mode {
            ProcessMode::Frame => [CallbackKind::Frame, CallbackKind::Sample, CallbackKind::Channel],
            ProcessMode::Block => [CallbackKind::Channel, CallbackKind::Frame, CallbackKind::Sample],
        };
        order
            .into_iter()
            .find(|kind| self.has(*kind))
            .unwrap_or(CallbackKind::Inactive)
    }

    pub fn best_callback_name(&self, mode: ProcessMode) -> &'static str {
        self.best_callback(mode).name()
    }

    fn has(&self, kind: CallbackKind) -> bool {
        match kind {
            CallbackKind::Sample => self.sample.is_some(),
            CallbackKind::Frame => self.frame.is_some(),
            CallbackKind::Channel => self.channel.is_some(),
            CallbackKind::Inactive => false,
        }
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Call `prepare` and then `reset`. Ignored for an unset sample rate or
    /// an empty configuration.
    pub fn prepare(&self, sample_rate: f64, block_size: i32, num_channels: i32) {
        if sample_rate == -1.0 || block_size == 0 || num_channels == 0 {
            return;
        }
        if let Some(prepare) = self.prepare {
            prepare(sample_rate, block_size, num_channels);
        }
        self.reset();
    }

    pub fn reset(&self) {
        if let Some(reset) = self.reset {
            reset();
        }
    }

    /// Forward `value` to `set<name>`. Returns false for unknown names.
    pub fn set_parameter(&self, name: &str, value: f64) -> bool {
        match self.parameters.iter().find(|p| p.name == name) {
            Some(p) => {
                (p.function)(value);
                true
            }
            None => false,
        }
    }

    /// Process one interleaved buffer of `num_channels` channels with the
    /// callback chosen for `mode`. Returns the callback that ran.
    pub fn process(&self, mode: ProcessMode, data: &mut [f32], num_channels: usize) -> CallbackKind {
        let kind = self.best_callback(mode);
        let num_channels = num_channels.max(1);
        match kind {
            CallbackKind::Frame => {
                if let Some(frame) = self.frame {
                    for chunk in data.chunks_mut(num_channels) {
                        let mut block = Block::from_slice(chunk);
                        frame(block.as_ptr());
                    }
                }
            }
            CallbackKind::Sample => {
                if let Some(sample) = self.sample {
                    for s in data.iter_mut() {
                        *s = sample(*s);
                    }
                }
            }
            CallbackKind::Channel => {
                if let Some(channel) = self.channel {
                    let frames = data.len() / num_channels;
                    let mut scratch = vec![0.0f32; frames];
                    for c in 0..num_channels {
                        for (i, s) in scratch.iter_mut().enumerate() {
                            *s = data[i * num_channels + c];
                        }
                        let mut block = Block::from_slice(&mut scratch);
                        channel(block.as_ptr(), c as i32);
                        for (i, s) in scratch.iter().enumerate() {
                            data[i * num_channels + c] = *s;
                        }
                    }
                }
            }
            CallbackKind::Inactive => {}
        }
        kind
    }
}

impl std::fmt::Debug for CallbackCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackCollection")
            .field("frame_mode", &self.best_callback_name(ProcessMode::Frame))
            .field("block_mode", &self.best_callback_name(ProcessMode::Block))
            .field("parameters", &self.parameters)
            .finish()
    }
}
