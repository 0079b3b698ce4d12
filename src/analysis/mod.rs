pub mod structure;
pub mod classifier;
pub mod extractor;
pub mod pair_checker;
pub mod full_text;
pub mod pipeline;

pub use classifier::{ClassificationRequest, ExtractionClassifier};
pub use extractor::ItemExtractor;
pub use full_text::FullTextAnalyzer;
pub use pair_checker::{aggregate, PairChecker};
pub use pipeline::{
    AnalysisPipeline, AnalysisRun, DirectiveKind, Directives, ExtractionDirective, SideReport,
    Strategy,
};
pub use structure::DocumentStructure;
