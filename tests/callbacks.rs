// tests/callbacks.rs
//! Callback discovery and priority on compiled programs.

use snex::{CallbackCollection, CallbackKind, CompileConfig, ProcessMode, compile_object};

fn collect(source: &str) -> CallbackCollection {
    match compile_object(source, &CompileConfig::default()) {
        Ok(object) => CallbackCollection::new(object),
        Err(e) => panic!("compile failed: {e}"),
    }
}

#[test]
fn frame_mode_prefers_frame_and_block_mode_prefers_channel() {
    let callbacks = collect(
        "void prepare(double sampleRate, int blockSize, int numChannels) {}\n\
         void reset() {}\n\
         void processFrame(dyn<float> d) {}\n\
         void processChannel(dyn<float> d, int numChannels) {}\n",
    );
    assert_eq!(callbacks.best_callback_name(ProcessMode::Frame), "Frame");
    assert_eq!(callbacks.best_callback_name(ProcessMode::Block), "Channel");
}

#[test]
fn sample_callback_is_the_frame_fallback() {
    let callbacks = collect(
        "float processSample(float input) { return input * 0.5f; }\n\
         void processChannel(block b, int channel) {}\n",
    );
    assert_eq!(callbacks.best_callback(ProcessMode::Frame), CallbackKind::Sample);
    assert_eq!(callbacks.best_callback(ProcessMode::Block), CallbackKind::Channel);

    let only_sample = collect("float processSample(float input) { return input; }");
    assert_eq!(only_sample.best_callback(ProcessMode::Block), CallbackKind::Sample);
}

#[test]
fn wrong_signatures_are_ignored() {
    let callbacks = collect(
        "int processSample(int input) { return input; }\n\
         void processFrame(block b, int extra) {}\n",
    );
    assert_eq!(callbacks.best_callback_name(ProcessMode::Frame), "Inactive");
    assert_eq!(callbacks.best_callback_name(ProcessMode::Block), "Inactive");
}

#[test]
fn prepare_then_reset_then_process() {
    let callbacks = collect(
        "double rate = 0.0;\n\
         float gain = 0.0f;\n\
         float level = 1.0f;\n\
         void prepare(double sampleRate, int blockSize, int numChannels) { rate = sampleRate; gain = 2.0f; }\n\
         void reset() { gain = gain * 2.0f; }\n\
         void setLevel(double value) { level = (float)value; }\n\
         float processSample(float input) { return input * gain * level; }\n",
    );
    let names: Vec<&str> = callbacks.parameters().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Level"]);

    // Ignored without a configuration
    callbacks.prepare(44100.0, 0, 2);
    let rate = callbacks.object().get_data_pointer("rate").unwrap() as *const f64;
    assert_eq!(unsafe { *rate }, 0.0);

    callbacks.prepare(48000.0, 64, 1);
    assert_eq!(unsafe { *rate }, 48000.0);
    assert!(callbacks.set_parameter("Level", 0.5));
    assert!(!callbacks.set_parameter("Missing", 1.0));

    let mut data = [1.0f32, 0.5, 0.0];
    let used = callbacks.process(ProcessMode::Frame, &mut data, 1);
    assert_eq!(used, CallbackKind::Sample);
    assert_eq!(data, [2.0, 1.0, 0.0]);
}

#[test]
fn channel_callback_sees_deinterleaved_channels() {
    let callbacks = collect(
        "void processChannel(block b, int channel) {\n\
             for (auto& s : b) s = s + (float)channel;\n\
         }\n",
    );
    let mut data = [1.0f32, 10.0, 2.0, 20.0];
    let used = callbacks.process(ProcessMode::Block, &mut data, 2);
    assert_eq!(used, CallbackKind::Channel);
    assert_eq!(data, [1.0, 11.0, 2.0, 21.0]);
}

#[test]
fn frame_callback_gets_one_frame_per_call() {
    let callbacks = collect(
        "int calls = 0;\n\
         void processFrame(block frame) { calls++; frame[1] = frame[0] + (float)frame.size(); }\n",
    );
    let mut data = [1.0f32, 0.0, 3.0, 0.0, 5.0, 0.0];
    callbacks.process(ProcessMode::Frame, &mut data, 2);
    assert_eq!(data, [1.0, 3.0, 3.0, 5.0, 5.0, 7.0]);
    let calls = callbacks.object().get_data_pointer("calls").unwrap() as *const i32;
    assert_eq!(unsafe { *calls }, 3);
}
