use burn::backend::NdArray;
use burn::prelude::*;
use burn::tensor::Distribution;

use sthcs_net::model::{IMAGE_SIZE, IN_CHANNELS, NUM_CLASSES};
use sthcs_net::{render, SthcsNet};

type BackendType = NdArray;
type DeviceType = <BackendType as Backend>::Device;

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    println!("STHCSNet — Swin/conv hybrid classifier");
    println!("======================================\n");

    let device: DeviceType = DeviceType::default();
    let net: SthcsNet<BackendType> = SthcsNet::new(&device, NUM_CLASSES)?;

    print!("{}", render(&net));

    log::info!("running a smoke forward pass");
    let input = Tensor::random(
        [1, IN_CHANNELS, IMAGE_SIZE, IMAGE_SIZE],
        Distribution::Uniform(0.0, 1.0),
        &device,
    );
    let logits = net.forward(input);

    println!(
        "\nForward pass: [1, {IN_CHANNELS}, {IMAGE_SIZE}, {IMAGE_SIZE}] -> {:?}",
        logits.dims()
    );

    Ok(())
}
