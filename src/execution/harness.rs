//! Harness generation
//!
//! The harness is the bundle's entry point. It reads the input file named by
//! its first argument, classifies it the same way [`crate::core::classify`]
//! does, calls the user's `transform` export with `{ raw, data }` and prints
//! the JSON result. A thrown error goes to stderr with exit status 1.

use crate::core::InputFormat;

/// Module name the harness imports the user script under
pub const USER_MODULE: &str = "./userTransform";

const TEMPLATE: &str = r#"import * as fs from 'fs';
import * as userModule from '__USER_MODULE__';

function classify(raw: string): any {
__CLASSIFY__
}

const inputPath = process.argv[2];
const raw = fs.readFileSync(inputPath, 'utf-8');
const input = { raw, data: classify(raw) };

// Scripts written against the ambient global still work
(globalThis as any).input = input;

async function main(): Promise<void> {
    const transform = (userModule as any).transform;
    if (typeof transform !== 'function') {
        throw new Error('transform script must export a function named "transform"');
    }
    const result = await transform(input);
    console.log(JSON.stringify(result === undefined ? null : result, null, 2));
}

main().catch((e) => {
    console.error(e instanceof Error ? (e.stack || e.message) : String(e));
    process.exit(1);
});
"#;

/// Builds harness source for one input format
#[derive(Debug, Clone)]
pub struct HarnessBuilder {
    format: InputFormat,
    user_module: String,
}

impl HarnessBuilder {
    pub fn new(format: InputFormat) -> Self {
        Self {
            format,
            user_module: USER_MODULE.to_string(),
        }
    }

    pub fn with_user_module(mut self, module: impl Into<String>) -> Self {
        self.user_module = module.into();
        self
    }

    /// Generate the harness source
    pub fn build(&self) -> String {
        TEMPLATE
            .replace("__USER_MODULE__", &self.user_module)
            .replace("__CLASSIFY__", classify_body(self.format))
    }
}

fn classify_body(format: InputFormat) -> &'static str {
    match format {
        InputFormat::Json => {
            "    try {\n        return JSON.parse(raw);\n    } catch {\n        return raw;\n    }"
        }
        InputFormat::Csv => "    return raw.split('\\n').map((line) => line.split(','));",
        InputFormat::Lines => "    return raw.split('\\n');",
        InputFormat::Raw => "    return raw;",
    }
}
