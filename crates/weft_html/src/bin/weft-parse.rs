use weft_html::parser::{HtmlParser, ParserOptions};
use weft_shared::errors::Result;

/// Parses the file given on the command line (or a built-in snippet) and
/// prints the materialized tree as JSON.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let parser = HtmlParser::new(ParserOptions::default());

    let tree = match std::env::args().nth(1) {
        Some(path) => parser.parse_file(&path).await?.to_array().await?,
        None => {
            parser
                .parse_string("<!DOCTYPE html><p>Hello<b>world</b></p>")
                .to_array()
                .await?
        }
    };

    match serde_json::to_string_pretty(&tree) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("could not serialize tree: {err}"),
    }

    Ok(())
}
