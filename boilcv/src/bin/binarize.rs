use boilcv::{run_cli, Stage};

fn main() -> anyhow::Result<()> {
    run_cli(&[Stage::Binarize])
}
