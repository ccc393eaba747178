use crate::naming;
use crate::types::{Language, UnsupportedLanguage};

/// Name of the compiled artifact inside a workspace.
/// Fixed, so nothing user-provided ever lands in an argv slot.
pub const BINARY_NAME: &str = "main";

/// One slot of a command template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandArg {
    /// Passed through verbatim
    Literal(&'static str),
    /// The workspace source file name (e.g. `main.c`, `Main.java`)
    Source,
    /// The compiled artifact name (`main`)
    Binary,
    /// The compiled artifact as a relative executable path (`./main`)
    BinaryPath,
}

use self::CommandArg::{Binary, BinaryPath, Literal, Source};

/// Static per-language build/run metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    pub language: Language,
    /// Extension including the leading dot
    pub file_extension: &'static str,
    /// Base name of the source file (Java requires the public class name)
    pub source_stem: &'static str,
    pub compile: Option<&'static [CommandArg]>,
    pub run: &'static [CommandArg],
}

impl LanguageProfile {
    pub fn source_file_name(&self) -> String {
        format!("{}{}", self.source_stem, self.file_extension)
    }

    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    pub fn image_tag(&self) -> String {
        naming::image_tag(&self.language)
    }

    pub fn compile_argv(&self) -> Option<Vec<String>> {
        self.compile.map(|template| self.render(template))
    }

    pub fn run_argv(&self) -> Vec<String> {
        self.render(self.run)
    }

    /// Substitute the fixed filename slots; no other values are interpolated
    fn render(&self, template: &[CommandArg]) -> Vec<String> {
        template
            .iter()
            .map(|arg| match arg {
                Literal(s) => (*s).to_string(),
                Source => self.source_file_name(),
                Binary => BINARY_NAME.to_string(),
                BinaryPath => format!("./{}", BINARY_NAME),
            })
            .collect()
    }
}

// Templates, one per command shape
const NODE: &[CommandArg] = &[Literal("node"), Source];
const PYTHON3: &[CommandArg] = &[Literal("python3"), Source];
const RUBY_RUN: &[CommandArg] = &[Literal("ruby"), Source];
const PHP_RUN: &[CommandArg] = &[Literal("php"), Source];
const PERL_RUN: &[CommandArg] = &[Literal("perl"), Source];
const RSCRIPT: &[CommandArg] = &[Literal("Rscript"), Source];
const GCC: &[CommandArg] = &[Literal("gcc"), Literal("-o"), Binary, Source];
const GXX: &[CommandArg] = &[Literal("g++"), Literal("-o"), Binary, Source];
const GO_BUILD: &[CommandArg] = &[Literal("go"), Literal("build"), Literal("-o"), Binary, Source];
const RUSTC: &[CommandArg] = &[Literal("rustc"), Literal("-o"), Binary, Source];
const SWIFTC: &[CommandArg] = &[Literal("swiftc"), Literal("-o"), Binary, Source];
const GHC: &[CommandArg] = &[Literal("ghc"), Literal("-o"), Binary, Source];
const JAVAC: &[CommandArg] = &[Literal("javac"), Source];
const JAVA_RUN: &[CommandArg] = &[Literal("java"), Literal("Main")];
const RUN_BINARY: &[CommandArg] = &[BinaryPath];

const fn interpreted(
    language: Language,
    file_extension: &'static str,
    run: &'static [CommandArg],
) -> LanguageProfile {
    LanguageProfile {
        language,
        file_extension,
        source_stem: "main",
        compile: None,
        run,
    }
}

const fn compiled(
    language: Language,
    file_extension: &'static str,
    compile: &'static [CommandArg],
) -> LanguageProfile {
    LanguageProfile {
        language,
        file_extension,
        source_stem: "main",
        compile: Some(compile),
        run: RUN_BINARY,
    }
}

static JAVASCRIPT: LanguageProfile = interpreted(Language::JavaScript, ".js", NODE);
static PYTHON: LanguageProfile = interpreted(Language::Python, ".py", PYTHON3);
static RUBY: LanguageProfile = interpreted(Language::Ruby, ".rb", RUBY_RUN);
static PHP: LanguageProfile = interpreted(Language::Php, ".php", PHP_RUN);
static PERL: LanguageProfile = interpreted(Language::Perl, ".pl", PERL_RUN);
static R: LanguageProfile = interpreted(Language::R, ".R", RSCRIPT);

static C: LanguageProfile = compiled(Language::C, ".c", GCC);
static CPP: LanguageProfile = compiled(Language::Cpp, ".cpp", GXX);
static GO: LanguageProfile = compiled(Language::Go, ".go", GO_BUILD);
static RUST: LanguageProfile = compiled(Language::Rust, ".rs", RUSTC);
static SWIFT: LanguageProfile = compiled(Language::Swift, ".swift", SWIFTC);
static HASKELL: LanguageProfile = compiled(Language::Haskell, ".hs", GHC);

// The public class has to be `Main`, so the file is `Main.java` and the
// run step names the class rather than a binary.
static JAVA: LanguageProfile = LanguageProfile {
    language: Language::Java,
    file_extension: ".java",
    source_stem: "Main",
    compile: Some(JAVAC),
    run: JAVA_RUN,
};

/// Profile for an already-parsed language
pub fn profile(language: Language) -> &'static LanguageProfile {
    match language {
        Language::JavaScript => &JAVASCRIPT,
        Language::Python => &PYTHON,
        Language::C => &C,
        Language::Cpp => &CPP,
        Language::Java => &JAVA,
        Language::Go => &GO,
        Language::Rust => &RUST,
        Language::Ruby => &RUBY,
        Language::Php => &PHP,
        Language::Perl => &PERL,
        Language::Swift => &SWIFT,
        Language::Haskell => &HASKELL,
        Language::R => &R,
    }
}

/// Resolve a caller-supplied language identifier
pub fn resolve(language_id: &str) -> Result<&'static LanguageProfile, UnsupportedLanguage> {
    language_id.parse::<Language>().map(profile)
}
