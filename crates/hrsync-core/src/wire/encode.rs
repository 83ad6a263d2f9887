//! Wire value encoding

use super::Value;

/// Encode a method call envelope with its ordered parameters.
#[must_use]
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(128);
    out.push_str("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        write_value(param, &mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    out
}

/// Encode a single value node, `<value>` wrapper included.
#[must_use]
pub fn encode_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => {
            out.push_str("<int>");
            out.push_str(&i.to_string());
            out.push_str("</int>");
        }
        Value::Double(d) => {
            out.push_str("<double>");
            out.push_str(&d.to_string());
            out.push_str("</double>");
        }
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push(if *b { '1' } else { '0' });
            out.push_str("</boolean>");
        }
        Value::Str(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(item, out);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name));
                out.push_str("</name>");
                write_value(member, out);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        // Faults only exist on the decode side; degrade to the message.
        Value::Fault(message) => {
            out.push_str("<string>");
            out.push_str(&escape(message));
            out.push_str("</string>");
        }
    }
    out.push_str("</value>");
}

/// Escape the three characters the grammar reserves.
pub(crate) fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scalars() {
        assert_eq!(encode_value(&Value::Int(42)), "<value><int>42</int></value>");
        assert_eq!(
            encode_value(&Value::Double(1.5)),
            "<value><double>1.5</double></value>"
        );
        assert_eq!(
            encode_value(&Value::Bool(true)),
            "<value><boolean>1</boolean></value>"
        );
        assert_eq!(
            encode_value(&Value::Bool(false)),
            "<value><boolean>0</boolean></value>"
        );
    }

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(
            encode_value(&Value::string("Ali & Co <hr>")),
            "<value><string>Ali &amp; Co &lt;hr&gt;</string></value>"
        );
    }

    #[test]
    fn encodes_nested_array_of_structs() {
        let value = Value::Array(vec![Value::Struct(vec![(
            "id".to_string(),
            Value::Int(1),
        )])]);
        assert_eq!(
            encode_value(&value),
            "<value><array><data><value><struct><member><name>id</name>\
            <value><int>1</int></value></member></struct></value></data></array></value>"
        );
    }

    #[test]
    fn call_envelope_wraps_each_param() {
        let wire = encode_call("authenticate", &[
            Value::string("db"),
            Value::string("admin"),
            Value::string("secret"),
            Value::Struct(Vec::new()),
        ]);
        assert!(wire.starts_with("<?xml version=\"1.0\"?>"));
        assert!(wire.contains("<methodName>authenticate</methodName>"));
        assert_eq!(wire.matches("<param>").count(), 4);
        assert!(wire.contains("<value><struct></struct></value>"));
    }
}
