mod importer;
mod model;
mod parsers;

use crate::importer::TraceImporter;
use crate::model::Model;
use clap::Parser;
use eyre::Context;
use eyre::eyre;
use serde_derive::Serialize;
use std::io::Write;

mod cli {
    #[derive(clap_derive::Parser)]
    #[command(version, about)]
    /// Convert ftrace / perf text traces into a timeline model
    pub struct Cli {
        #[clap(short, long)]
        pub verbose: bool,
        /// Trace text files to import. The second and later files are
        /// layered onto the model as additional imports and must carry a
        /// clock sync marker.
        #[clap(required = true)]
        pub inputs: Vec<String>,
        /// The name of the output file to write (defaults to stdout)
        #[clap(short, long)]
        pub output: Option<String>,
    }
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = cli::Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut model = Model::default();
    for (index, input) in cli.inputs.iter().enumerate() {
        let text = std::fs::read_to_string(input)
            .wrap_err_with(|| format!("Failed to read trace file \"{input}\""))?;
        if !importer::can_import(&text) {
            return Err(eyre!("\"{input}\" does not look like an ftrace/perf text trace"));
        }
        TraceImporter::new(&mut model, index > 0)
            .import(&text)
            .wrap_err_with(|| format!("Failed to import \"{input}\""))?;
    }
    for diagnostic in &model.import_errors {
        log::warn!("{diagnostic}");
    }

    let file: &mut dyn Write = match cli.output {
        Some(output) => &mut std::fs::File::create(output)?,
        None => &mut std::io::stdout().lock(),
    };
    let mut writer = std::io::BufWriter::new(file);
    write_timeline(&model, &mut writer)?;
    Ok(())
}

#[derive(Serialize)]
struct TimelineHeader<'m> {
    cpus: usize,
    processes: usize,
    import_errors: &'m [String],
}

/// Write the model as newline-delimited JSON: one header line with summary
/// metadata, then one line per CPU and one per process.
fn write_timeline(model: &Model, writer: &mut impl Write) -> Result<(), eyre::Error> {
    let header = TimelineHeader {
        cpus: model.cpus.len(),
        processes: model.processes.len(),
        import_errors: &model.import_errors,
    };
    serde_json::to_writer(&mut *writer, &header)?;
    writeln!(writer)?;
    for cpu in model.cpus.values() {
        serde_json::to_writer(&mut *writer, cpu)?;
        writeln!(writer)?;
    }
    for process in model.processes.values() {
        serde_json::to_writer(&mut *writer, process)?;
        writeln!(writer)?;
    }
    Ok(())
}
