use crate::config::types::Language;
use crate::error::Result;
use crate::harness::generator::{count_case_args, test_data_json, HarnessFile, HarnessGenerator, HarnessPlan};

#[derive(Debug, Clone, Default)]
pub struct CppGenerator;

const DEFAULT_COMPARATOR: &str = "output == expected";

/// Raw characters per adjacent string literal fragment.
const CHUNK_CHARS: usize = 500;

/// No reflection in C++: solutions take and return `Value`, and the call
/// arity is fixed from the case format at generation time.
const TEMPLATE: &str = r#"#include <cctype>
#include <cstdint>
#include <cstdio>
#include <exception>
#include <iostream>
#include <sstream>
#include <stdexcept>
#include <string>
#include <utility>
#include <vector>

class Value {
public:
    enum class Kind { Null, Bool, Num, Str, Arr, Obj };

    Kind kind = Kind::Null;
    bool boolean = false;
    double number = 0.0;
    std::string text;
    std::vector<Value> items;
    std::vector<std::pair<std::string, Value>> fields;

    Value() = default;
    Value(bool b) : kind(Kind::Bool), boolean(b) {}
    Value(int n) : kind(Kind::Num), number(n) {}
    Value(long long n) : kind(Kind::Num), number(static_cast<double>(n)) {}
    Value(double n) : kind(Kind::Num), number(n) {}
    Value(const char* s) : kind(Kind::Str), text(s) {}
    Value(std::string s) : kind(Kind::Str), text(std::move(s)) {}
    Value(std::vector<Value> v) : kind(Kind::Arr), items(std::move(v)) {}

    bool operator==(const Value& other) const {
        if (kind != other.kind) return false;
        switch (kind) {
            case Kind::Null: return true;
            case Kind::Bool: return boolean == other.boolean;
            case Kind::Num: return number == other.number;
            case Kind::Str: return text == other.text;
            case Kind::Arr: return items == other.items;
            case Kind::Obj: return fields == other.fields;
        }
        return false;
    }
    bool operator!=(const Value& other) const { return !(*this == other); }

    const Value& at(const std::string& key) const {
        for (const auto& field : fields) {
            if (field.first == key) return field.second;
        }
        throw std::runtime_error("missing key: " + key);
    }

    double asNumber() const { return number; }
    long long asInt() const { return static_cast<long long>(number); }
    const std::string& asString() const { return text; }
    const std::vector<Value>& asArray() const { return items; }

    std::string dump() const {
        std::ostringstream out;
        write(out);
        return out.str();
    }

private:
    static void writeEscaped(std::ostream& out, const std::string& s) {
        out << '"';
        for (unsigned char c : s) {
            switch (c) {
                case '"': out << "\\\""; break;
                case '\\': out << "\\\\"; break;
                case '\n': out << "\\n"; break;
                case '\r': out << "\\r"; break;
                case '\t': out << "\\t"; break;
                default:
                    if (c < 0x20) {
                        char buf[8];
                        std::snprintf(buf, sizeof(buf), "\\u%04x", c);
                        out << buf;
                    } else {
                        out << c;
                    }
            }
        }
        out << '"';
    }

    void write(std::ostream& out) const {
        switch (kind) {
            case Kind::Null:
                out << "null";
                break;
            case Kind::Bool:
                out << (boolean ? "true" : "false");
                break;
            case Kind::Num: {
                double rounded = static_cast<double>(static_cast<long long>(number));
                if (rounded == number && number < 9.0e15 && number > -9.0e15) {
                    out << static_cast<long long>(number);
                } else {
                    std::ostringstream num;
                    num.precision(15);
                    num << number;
                    out << num.str();
                }
                break;
            }
            case Kind::Str:
                writeEscaped(out, text);
                break;
            case Kind::Arr: {
                out << '[';
                for (size_t i = 0; i < items.size(); i++) {
                    if (i > 0) out << ',';
                    items[i].write(out);
                }
                out << ']';
                break;
            }
            case Kind::Obj: {
                out << '{';
                for (size_t i = 0; i < fields.size(); i++) {
                    if (i > 0) out << ',';
                    writeEscaped(out, fields[i].first);
                    out << ':';
                    fields[i].second.write(out);
                }
                out << '}';
                break;
            }
        }
    }
};

class JsonParser {
public:
    explicit JsonParser(const std::string& text) : text_(text), pos_(0) {}

    size_t pos() const { return pos_; }
    void seek(size_t pos) { pos_ = pos; }

    Value parseValue() {
        skipWhitespace();
        if (pos_ >= text_.size()) throw std::runtime_error("unexpected end of input");
        char c = text_[pos_];
        if (c == '{') return parseObject();
        if (c == '[') return parseArray();
        if (c == '"') return Value(parseString());
        if (text_.compare(pos_, 4, "true") == 0) { pos_ += 4; return Value(true); }
        if (text_.compare(pos_, 5, "false") == 0) { pos_ += 5; return Value(false); }
        if (text_.compare(pos_, 4, "null") == 0) { pos_ += 4; return Value(); }
        return parseNumber();
    }

private:
    void skipWhitespace() {
        while (pos_ < text_.size() && std::isspace(static_cast<unsigned char>(text_[pos_]))) pos_++;
    }

    char next() {
        if (pos_ >= text_.size()) throw std::runtime_error("unexpected end of input");
        return text_[pos_++];
    }

    void expect(char c) {
        if (next() != c) throw std::runtime_error(std::string("expected '") + c + "'");
    }

    Value parseObject() {
        Value value;
        value.kind = Value::Kind::Obj;
        pos_++;
        skipWhitespace();
        if (text_[pos_] == '}') { pos_++; return value; }
        while (true) {
            skipWhitespace();
            std::string key = parseString();
            skipWhitespace();
            expect(':');
            value.fields.emplace_back(key, parseValue());
            skipWhitespace();
            char c = next();
            if (c == '}') return value;
            if (c != ',') throw std::runtime_error("expected ',' in object");
        }
    }

    Value parseArray() {
        Value value;
        value.kind = Value::Kind::Arr;
        pos_++;
        skipWhitespace();
        if (text_[pos_] == ']') { pos_++; return value; }
        while (true) {
            value.items.push_back(parseValue());
            skipWhitespace();
            char c = next();
            if (c == ']') return value;
            if (c != ',') throw std::runtime_error("expected ',' in array");
        }
    }

    std::string parseString() {
        expect('"');
        std::string out;
        while (true) {
            char c = next();
            if (c == '"') return out;
            if (c == '\\') {
                char esc = next();
                switch (esc) {
                    case '"': out += '"'; break;
                    case '\\': out += '\\'; break;
                    case '/': out += '/'; break;
                    case 'b': out += '\b'; break;
                    case 'f': out += '\f'; break;
                    case 'n': out += '\n'; break;
                    case 'r': out += '\r'; break;
                    case 't': out += '\t'; break;
                    case 'u': {
                        unsigned code = std::stoul(text_.substr(pos_, 4), nullptr, 16);
                        pos_ += 4;
                        if (code < 0x80) {
                            out += static_cast<char>(code);
                        } else if (code < 0x800) {
                            out += static_cast<char>(0xc0 | (code >> 6));
                            out += static_cast<char>(0x80 | (code & 0x3f));
                        } else {
                            out += static_cast<char>(0xe0 | (code >> 12));
                            out += static_cast<char>(0x80 | ((code >> 6) & 0x3f));
                            out += static_cast<char>(0x80 | (code & 0x3f));
                        }
                        break;
                    }
                    default: throw std::runtime_error("bad escape");
                }
            } else {
                out += c;
            }
        }
    }

    Value parseNumber() {
        size_t start = pos_;
        while (pos_ < text_.size() &&
               std::string("+-0123456789.eE").find(text_[pos_]) != std::string::npos) {
            pos_++;
        }
        return Value(std::stod(text_.substr(start, pos_ - start)));
    }

    const std::string& text_;
    size_t pos_;
};

static const std::string TEST_DATA =
@@DATA_CHUNKS@@;

@@SOLUTION@@

static std::vector<Value> parseArgs(const std::string& caseString) {
    std::vector<Value> args;
    JsonParser parser(caseString);
    size_t i = 0;
    while (i < caseString.size()) {
        while (i < caseString.size() && std::isspace(static_cast<unsigned char>(caseString[i]))) i++;
        if (i >= caseString.size()) break;
        if (caseString.compare(i, 2, "--") != 0) {
            throw std::runtime_error("malformed case string: " + caseString);
        }
        size_t eq = caseString.find('=', i);
        if (eq == std::string::npos) {
            throw std::runtime_error("malformed case string: " + caseString);
        }
        parser.seek(eq + 1);
        args.push_back(parser.parseValue());
        i = parser.pos();
    }
    return args;
}

static std::string runSuite(const std::vector<Value>& cases,
                            const std::vector<Value>& expectedValues,
                            bool includeInput) {
    std::ostringstream results;
    results << "[";
    int passedCount = 0;
    for (size_t i = 0; i < cases.size(); i++) {
        const std::string& caseString = cases[i].asString();
        const Value& expected = expectedValues[i];
        Value output;
        bool passed = false;
        std::string error;
        try {
            std::vector<Value> args = parseArgs(caseString);
            if (args.size() != @@ARGC@@) {
                throw std::runtime_error("expected @@ARGC@@ argument(s)");
            }
            Solution solution;
            output = solution.@@METHOD@@(@@ARGS@@);
            passed = (@@COMPARE@@);
        } catch (const std::exception& e) {
            error = e.what();
        } catch (...) {
            error = "unknown error";
        }
        if (passed) passedCount++;
        if (i > 0) results << ",";
        results << "{\"expected\":" << expected.dump()
                << ",\"output\":" << output.dump()
                << ",\"passed\":" << (passed ? "true" : "false");
        if (!error.empty()) results << ",\"error\":" << Value(error).dump();
        if (includeInput) results << ",\"input\":" << Value(caseString).dump();
        results << "}";
    }
    results << "]";
    std::ostringstream suite;
    suite << "{\"test_results\":" << results.str()
          << ",\"summary\":{\"total_tests\":" << cases.size()
          << ",\"passed_tests\":" << passedCount << "}}";
    return suite.str();
}

int main() {
    try {
        JsonParser parser(TEST_DATA);
        Value data = parser.parseValue();
        std::string hidden = runSuite(data.at("hidden_cases").asArray(),
                                      data.at("hidden_expected").asArray(), false);
        std::string samples = runSuite(data.at("sample_cases").asArray(),
                                       data.at("sample_expected").asArray(), true);
        std::cout << "EXECUTION_RESULTS:"
                  << "{\"hidden_results\":" << hidden
                  << ",\"sample_results\":" << samples << "}" << std::endl;
    } catch (const std::exception& e) {
        std::cout << "GLOBAL_ERROR:" << e.what() << std::endl;
        return 1;
    } catch (...) {
        std::cout << "GLOBAL_ERROR:unknown error" << std::endl;
        return 1;
    }
    return 0;
}
"#;

impl HarnessGenerator for CppGenerator {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn file_name(&self) -> &'static str {
        "harness.cpp"
    }

    fn generate(&self, plan: &HarnessPlan<'_>) -> Result<HarnessFile> {
        let data = serde_json::to_string(&test_data_json(plan))?;
        let argc = plan
            .hidden_cases
            .first()
            .or(plan.sample_cases.first())
            .map(|case| count_case_args(case))
            .unwrap_or(0);
        let args = (0..argc)
            .map(|i| format!("args[{i}]"))
            .collect::<Vec<_>>()
            .join(", ");
        let source = TEMPLATE
            .replace("@@DATA_CHUNKS@@", &chunk_literals(&data, CHUNK_CHARS))
            .replace("@@METHOD@@", plan.method_name)
            .replace("@@ARGC@@", &argc.to_string())
            .replace("@@ARGS@@", &args)
            .replace("@@COMPARE@@", plan.comparator.unwrap_or(DEFAULT_COMPARATOR))
            .replace("@@SOLUTION@@", plan.solution_source);
        Ok(HarnessFile {
            file_name: self.file_name(),
            source,
        })
    }
}

/// C++ string literal with every byte escaped safely. Control and
/// non-ASCII bytes use fixed three-digit octal escapes: unlike \u, octal
/// escapes below 0x20 are well-formed, and at three digits they cannot
/// swallow a following literal digit.
fn cpp_string_literal(piece: &str) -> String {
    let mut out = String::with_capacity(piece.len() + 2);
    out.push('"');
    for byte in piece.bytes() {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{byte:03o}")),
        }
    }
    out.push('"');
    out
}

/// Adjacent string literals concatenate at compile time; chunking keeps
/// each fragment within conservative translation limits.
fn chunk_literals(data: &str, chunk_chars: usize) -> String {
    if data.is_empty() {
        return "    \"\"".to_string();
    }
    let chars: Vec<char> = data.chars().collect();
    chars
        .chunks(chunk_chars)
        .map(|chunk| {
            let piece: String = chunk.iter().collect();
            format!("    {}", cpp_string_literal(&piece))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
