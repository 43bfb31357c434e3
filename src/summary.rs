use burn::module::Module;
use burn::prelude::*;

use crate::model::{stage_plan, SthcsNet, IMAGE_SIZE};

/// One printable row of the diagnostic summary.
#[derive(Debug, Clone)]
pub struct LayerSummary {
    pub name: &'static str,
    pub output_shape: String,
    pub params: usize,
}

/// Per-stage output shapes and parameter counts for a 224x224x3 input,
/// derived from the stage plan rather than a traced forward pass.
pub fn summarize<B: Backend>(net: &SthcsNet<B>) -> Vec<LayerSummary> {
    let plan = stage_plan();
    let mut rows = Vec::with_capacity(plan.len() + 4);

    let mut resolution = IMAGE_SIZE;
    let mut channels = 0;
    for (spec, stage) in plan.iter().zip(&net.stages) {
        resolution /= spec.down;
        channels = spec.c_out;
        rows.push(LayerSummary {
            name: spec.name(),
            output_shape: format!("{} x {} x {}", spec.c_out, resolution, resolution),
            params: stage.num_params(),
        });
    }

    let flat = channels * resolution * resolution;
    rows.push(LayerSummary {
        name: "Flatten",
        output_shape: format!("{flat}"),
        params: 0,
    });

    for (name, fc) in [
        ("Linear", &net.head.fc1),
        ("Linear", &net.head.fc2),
        ("Linear", &net.head.fc3),
    ] {
        let [_, out_features] = fc.weight.val().dims();
        rows.push(LayerSummary {
            name,
            output_shape: format!("{out_features}"),
            params: fc.num_params(),
        });
    }

    rows
}

/// Renders the summary as an aligned table with a parameter total.
pub fn render<B: Backend>(net: &SthcsNet<B>) -> String {
    let rows = summarize(net);
    let mut out = String::new();

    out.push_str(&format!(
        "{:<4} {:<14} {:<18} {:>12}\n",
        "#", "Layer", "Output shape", "Params"
    ));
    out.push_str(&format!("{}\n", "-".repeat(52)));

    for (i, row) in rows.iter().enumerate() {
        out.push_str(&format!(
            "{:<4} {:<14} {:<18} {:>12}\n",
            i + 1,
            row.name,
            row.output_shape,
            row.params
        ));
    }

    out.push_str(&format!("{}\n", "-".repeat(52)));
    out.push_str(&format!("Total params: {}\n", net.num_params()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NUM_CLASSES;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn summary_tracks_the_plan() {
        let device = Default::default();
        let net = SthcsNet::<TestBackend>::new(&device, NUM_CLASSES).unwrap();
        let rows = summarize(&net);

        // 21 stages + flatten + 3 head linears.
        assert_eq!(rows.len(), 25);
        assert_eq!(rows[0].output_shape, "64 x 224 x 224");
        assert_eq!(rows[20].output_shape, "768 x 7 x 7");
        assert_eq!(rows[21].output_shape, "37632");
        assert_eq!(rows[21].params, 0);
        assert_eq!(rows[24].output_shape, format!("{NUM_CLASSES}"));

        let stage_total: usize = rows.iter().map(|r| r.params).sum();
        assert_eq!(stage_total, net.num_params());
    }
}
