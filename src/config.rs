use std::ffi::OsString;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};

use crate::*;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "vocabulary-creator",
    version,
    about = "ORB bag-of-words vocabulary creation utility"
)]
pub struct Cli {
    /// Images to be used for vocabulary creation, as a directory followed
    /// by a file name wildcard, e.g. `data/train/*.png`
    #[arg(long = "sourceFiles", value_name = "sourceFilesPattern")]
    pub source_files: String,

    /// Output vocabulary filename
    #[arg(long = "vocabularyFilename", value_name = "vocabularyFilename")]
    pub vocabulary_filename: PathBuf,

    /// Number of children per vocabulary node
    #[arg(long = "branchingFactor", value_name = "k", default_value_t = 10)]
    pub branching_factor: usize,

    /// Number of vocabulary levels
    #[arg(long = "depthLevels", value_name = "L", default_value_t = 6)]
    pub depth_levels: usize,

    #[arg(long, value_enum, default_value_t = Weighting::TfIdf)]
    pub weighting: Weighting,

    #[arg(long, value_enum, default_value_t = Scoring::L1Norm)]
    pub scoring: Scoring,
}

impl Cli {
    /// Like [`Parser::parse_from`], but long options may also be written
    /// with a single dash (`-sourceFiles dir/*.png`).
    pub fn parse_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::parse_from(normalize_args(args))
    }

    pub fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(normalize_args(args))
    }
}

/// Rewrite `-longName[=value]` into `--longName[=value]` for every long
/// option the command knows. The program name is left alone.
fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let cmd = Cli::command();
    let mut longs: Vec<String> = cmd
        .get_arguments()
        .filter_map(|a| a.get_long())
        .map(str::to_owned)
        .collect();
    longs.extend(["help".to_owned(), "version".to_owned()]);

    args.into_iter()
        .map(Into::into)
        .enumerate()
        .map(|(i, arg)| {
            if i == 0 {
                return arg;
            }
            let Some(s) = arg.to_str() else {
                return arg;
            };
            match s.strip_prefix('-') {
                Some(rest) if !rest.starts_with('-') => {
                    let name = rest.split('=').next().unwrap_or(rest);
                    if longs.iter().any(|l| l == name) {
                        format!("-{s}").into()
                    } else {
                        arg
                    }
                }
                _ => arg,
            }
        })
        .collect()
}

/// Everything a run needs, fixed once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub source_pattern: String,
    pub output_path: PathBuf,
    pub params: VocabularyParams,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            source_pattern: cli.source_files,
            output_path: cli.vocabulary_filename,
            params: VocabularyParams {
                branching_factor: cli.branching_factor,
                depth_levels: cli.depth_levels,
                weighting: cli.weighting,
                scoring: cli.scoring,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use rstest::rstest;

    fn config(args: &[&str]) -> Config {
        Cli::try_parse_args(args).unwrap().into()
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn required_options_with_defaults() {
        let c = config(&[
            "vocabulary-creator",
            "--sourceFiles",
            "data/*.png",
            "--vocabularyFilename",
            "out.voc",
        ]);
        assert_eq!(c.source_pattern, "data/*.png");
        assert_eq!(c.output_path, PathBuf::from("out.voc"));
        assert_eq!(c.params, VocabularyParams::default());
    }

    #[test]
    fn single_dash_long_options() {
        let c = config(&[
            "vocabulary-creator",
            "-sourceFiles",
            "data/*.png",
            "-vocabularyFilename=out.voc",
            "-branchingFactor",
            "8",
        ]);
        assert_eq!(c.source_pattern, "data/*.png");
        assert_eq!(c.output_path, PathBuf::from("out.voc"));
        assert_eq!(c.params.branching_factor, 8);
    }

    #[test]
    fn optional_parameters() {
        let c = config(&[
            "vocabulary-creator",
            "--sourceFiles=*.jpg",
            "--vocabularyFilename=v.voc",
            "--depthLevels=3",
            "--weighting=binary",
            "--scoring=l2-norm",
        ]);
        assert_eq!(c.params.depth_levels, 3);
        assert_eq!(c.params.weighting, Weighting::Binary);
        assert_eq!(c.params.scoring, Scoring::L2Norm);
    }

    #[rstest]
    #[case(&["vocabulary-creator", "--vocabularyFilename", "out.voc"])]
    #[case(&["vocabulary-creator", "--sourceFiles", "*.png"])]
    #[case(&["vocabulary-creator"])]
    fn missing_required_option(#[case] args: &[&str]) {
        let err = Cli::try_parse_args(args).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_ne!(err.exit_code(), 0);
    }

    #[rstest]
    #[case("--help", ErrorKind::DisplayHelp)]
    #[case("-help", ErrorKind::DisplayHelp)]
    #[case("--version", ErrorKind::DisplayVersion)]
    fn informational_exits(#[case] flag: &str, #[case] kind: ErrorKind) {
        let err = Cli::try_parse_args(["vocabulary-creator", flag]).unwrap_err();
        assert_eq!(err.kind(), kind);
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn unknown_weighting_is_rejected() {
        let err = Cli::try_parse_args([
            "vocabulary-creator",
            "--sourceFiles=*.png",
            "--vocabularyFilename=v.voc",
            "--weighting=bm25",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn short_flags_are_untouched() {
        let args = normalize_args(["prog", "-x", "--sourceFiles", "-"]);
        assert_eq!(args, ["prog", "-x", "--sourceFiles", "-"]);
    }
}
