use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP search service.
    Serve {
        /// Address to listen on. Overrides server.bind from config.yaml
        #[clap(short, long)]
        bind: Option<String>,
    },
    /// Search the catalog and print results as JSON
    Search {
        /// Free-text ingredient query, any language
        #[clap(allow_hyphen_values = true)]
        query: String,

        /// Maximum number of ingredients returned
        #[clap(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Delete the embedding cache and build it again.
    Rebuild {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let args = Args::try_parse_from(["ingredient-search", "search", "vitamin c", "-k", "3"]).unwrap();
        match args.command {
            Command::Search { query, top_k } => {
                assert_eq!(query, "vitamin c");
                assert_eq!(top_k, Some(3));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_serve() {
        let args = Args::try_parse_from(["ingredient-search", "serve", "--bind", "127.0.0.1:9000"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Serve { bind: Some(ref b) } if b == "127.0.0.1:9000"
        ));

        let args = Args::try_parse_from(["ingredient-search", "rebuild"]).unwrap();
        assert!(matches!(args.command, Command::Rebuild {}));
    }

    #[test]
    fn test_negative_top_k_rejected() {
        let result = Args::try_parse_from(["ingredient-search", "search", "salt", "--top-k", "-1"]);
        assert!(result.is_err());
    }
}
