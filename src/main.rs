use clap::Parser;
use log::error;
use slide_segmenter::api::{RunError, VideoSegmenter};
use slide_segmenter::core::results::{JsonFileSink, ResultSink, RunResult};
use slide_segmenter::core::text::TesseractExtractor;
use slide_segmenter::core::video::FfmpegTools;
use slide_segmenter::segmenter::{ConfigError, SegmentationConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "slide-segmenter")]
#[command(version, about = "Split a lecture video into slide intervals with their on-screen text")]
struct Args {
    /// Lecture video file
    video: PathBuf,

    /// JSON store the run is appended to
    #[arg(long, default_value = "Results.json")]
    results: PathBuf,

    /// Segmentation config (JSON); command line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sampling cadence in seconds of video time
    #[arg(long)]
    cadence: Option<f64>,

    /// L2 frame difference above which a slide change is assumed
    #[arg(long)]
    change_threshold: Option<f64>,

    /// Partial-ratio score (0-100) above which text continues the previous slide
    #[arg(long)]
    similarity: Option<u8>,

    /// Fraction of the frame height cropped from the bottom before comparing
    #[arg(long)]
    watermark: Option<f64>,

    /// Tesseract language
    #[arg(long, default_value = "eng")]
    lang: String,

    #[arg(long, default_value = "tesseract")]
    tesseract: PathBuf,

    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    #[arg(long, default_value = "ffprobe")]
    ffprobe: PathBuf,
}

impl Args {
    fn segmentation_config(&self) -> Result<SegmentationConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => SegmentationConfig::from_file(path)?,
            None => SegmentationConfig::default(),
        };
        if let Some(cadence) = self.cadence {
            config.sampling_cadence_secs = cadence;
        }
        if let Some(threshold) = self.change_threshold {
            config.change_threshold_l2 = threshold;
        }
        if let Some(similarity) = self.similarity {
            config.continuation_similarity_threshold = similarity;
        }
        if let Some(watermark) = self.watermark {
            config.watermark_fraction = watermark;
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_table(result: &RunResult) {
    println!("{:>10}  {:>10}  TEXT", "START", "END");
    for interval in &result.text_data {
        let text = interval.text_value.split_whitespace().collect::<Vec<_>>().join(" ");
        println!(
            "{:>10.2}  {:>10.2}  {}",
            interval.start_time, interval.end_time, text
        );
    }
}

fn run(args: &Args) -> Result<RunResult, RunError> {
    let config = args
        .segmentation_config()
        .map_err(|e| RunError::Segment(e.into()))?;

    let extractor = TesseractExtractor::new()
        .with_binary(&args.tesseract)
        .with_language(&args.lang)
        .with_timeout(config.ocr_timeout());
    let sink = JsonFileSink::new(&args.results);

    let segmenter = VideoSegmenter::create(config)?.with_tools(FfmpegTools {
        ffmpeg: args.ffmpeg.clone(),
        ffprobe: args.ffprobe.clone(),
    });
    let result = segmenter.process_file(&args.video, &extractor, &sink)?;

    print_table(&result);
    println!("\nResults saved to {}", sink.location());
    println!(
        "Total processing time: {:.2} seconds",
        result.total_processing_time_seconds
    );
    Ok(result)
}

fn main() -> ExitCode {
    slide_segmenter::init_logging();
    let args = Args::parse();

    match run(&args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}
