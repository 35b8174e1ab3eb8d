//! Run with: cargo run --package server --bin generate-types --features typescript

use std::fs;
use std::path::Path;

const OUT_DIR: &str = "frontend/src/types/generated";

#[cfg(feature = "typescript")]
macro_rules! export_types {
    ($out_dir:expr; $($ty:path),+ $(,)?) => {{
        use ts_rs::TS;
        let mut names = Vec::new();
        $(
            <$ty>::export_all_to($out_dir)?;
            names.push(<$ty>::ident());
        )+
        names
    }};
}

fn main() -> anyhow::Result<()> {
    println!("Generating TypeScript types...");

    let out_dir = Path::new(OUT_DIR);
    fs::create_dir_all(out_dir)?;

    #[cfg(feature = "typescript")]
    {
        let names = export_types!(out_dir;
            pathfinder_core::PlanRequest,
            pathfinder_core::PlanResponse,
            pathfinder_core::RankedVenue,
            pathfinder_core::PendingAction,
            pathfinder_core::ExecutionSummary,
            pathfinder_core::StageId,
            pathfinder_core::StageOutcome,
            pathfinder_core::ComplexityTier,
            events::EventEnvelope,
            events::Event,
            websocket::ClientMessage,
            websocket::ServerMessage,
            websocket::SubscriptionFilter,
        );
        println!("Types exported to {}", out_dir.display());

        generate_index(out_dir, &names)?;
    }

    #[cfg(not(feature = "typescript"))]
    {
        eprintln!("Error: typescript feature is not enabled");
        eprintln!("Run with: cargo run --package server --bin generate-types --features typescript");
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(feature = "typescript")]
fn generate_index(out_dir: &Path, names: &[String]) -> std::io::Result<()> {
    let index_path = out_dir.join("index.ts");

    let mut exports = String::from(
        "// Auto-generated - regenerate with: cargo run --package server --bin generate-types --features typescript\n\n",
    );
    for name in names {
        exports.push_str(&format!("export * from './{}';\n", name));
    }

    fs::write(&index_path, exports)?;
    println!("Generated {}", index_path.display());
    Ok(())
}
