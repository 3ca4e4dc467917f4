use crate::config::types::Language;
use crate::harness::generator::HarnessGenerator;
use crate::harness::languages::{cpp::CppGenerator, java::JavaGenerator, python::PythonGenerator};

static PYTHON: PythonGenerator = PythonGenerator;
static JAVA: JavaGenerator = JavaGenerator;
static CPP: CppGenerator = CppGenerator;

pub fn generator_for(language: Language) -> &'static dyn HarnessGenerator {
    match language {
        Language::Python => &PYTHON,
        Language::Java => &JAVA,
        Language::Cpp => &CPP,
    }
}
