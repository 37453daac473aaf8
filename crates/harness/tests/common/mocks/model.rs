use cosim_harness::sim::{CoreInputs, CoreModel, CoreOutputs};

/// A hardware model that replays fixed outputs and records what it was driven with.
///
/// `outputs` for step `n` (1-based) come from `script[n - 1]`; steps past the end
/// of the script see idle outputs.
#[derive(Default)]
pub struct ScriptedCore {
    script: Vec<CoreOutputs>,
    finish_after: Option<usize>,
    pub evals: usize,
    pub clocks: Vec<bool>,
    pub resets: Vec<bool>,
    /// Inputs driven at each eval, tagged with the step they were driven on.
    pub driven: Vec<(usize, CoreInputs)>,
}

impl ScriptedCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the outputs seen on step `step` (1-based).
    pub fn at(mut self, step: usize, outputs: CoreOutputs) -> Self {
        if self.script.len() < step {
            self.script.resize(step, CoreOutputs::default());
        }
        self.script[step - 1] = outputs;
        self
    }

    /// Reports `finished()` once `evals` evaluations have run.
    pub fn finish_after(mut self, evals: usize) -> Self {
        self.finish_after = Some(evals);
        self
    }

    /// Inputs driven on step `step`, if any.
    pub fn driven_at(&self, step: usize) -> Option<CoreInputs> {
        self.driven
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, inputs)| *inputs)
    }
}

impl CoreModel for ScriptedCore {
    fn set_clock(&mut self, high: bool) {
        self.clocks.push(high);
    }

    fn set_reset(&mut self, asserted: bool) {
        self.resets.push(asserted);
    }

    fn outputs(&self) -> CoreOutputs {
        self.script.get(self.evals).copied().unwrap_or_default()
    }

    fn drive(&mut self, inputs: &CoreInputs) {
        self.driven.push((self.evals + 1, *inputs));
    }

    fn eval(&mut self) {
        self.evals += 1;
    }

    fn finished(&self) -> bool {
        self.finish_after.is_some_and(|n| self.evals >= n)
    }
}

/// Store outputs for the data port.
pub fn store(addr: u32, data: u64, size: u8) -> CoreOutputs {
    CoreOutputs {
        dcache_we: true,
        dcache_addr: addr,
        dcache_data: data,
        dcache_size: size,
        ..CoreOutputs::default()
    }
}

/// Load outputs for the data port.
pub fn load(addr: u32) -> CoreOutputs {
    CoreOutputs {
        dcache_addr: addr,
        ..CoreOutputs::default()
    }
}
