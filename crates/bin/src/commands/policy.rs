//! Policy check command - validates a policy book and reports the effective
//! strategy per document and element class.

use concord::policy::PolicyBook;

use crate::cli::PolicyCheckArgs;
use crate::output::OutputFormat;

/// Run the policy check command
pub fn run(args: &PolicyCheckArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(&args.policy)?;
    let book: PolicyBook = serde_json::from_str(&text)?;
    book.validate()?;

    match format {
        OutputFormat::Human => {
            println!("Policy book:  {}", args.policy.display());
            println!("Default:      {}", book.default.strategy);
            for (doc, policy) in &book.documents {
                println!("Document {doc}:  {}", policy.strategy);
            }
            for (class, policy) in &book.element_classes {
                println!("Class {class}:  {}", policy.strategy);
            }
            println!("OK");
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "policy": args.policy.display().to_string(),
                "valid": true,
                "default": book.default.strategy,
                "documents": book.documents.iter()
                    .map(|(doc, p)| (doc.clone(), p.strategy))
                    .collect::<std::collections::BTreeMap<_, _>>(),
                "element_classes": book.element_classes.iter()
                    .map(|(class, p)| (class.clone(), p.strategy))
                    .collect::<std::collections::BTreeMap<_, _>>(),
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }

    Ok(())
}
