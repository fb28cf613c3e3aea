//! Minimal TwiML generation for voice responses. Only the verbs this agent
//! speaks: Say, Gather (speech input), and Hangup.

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Prompt the caller and gather their speech, with a polite hangup if no
/// input arrives before the timeout.
pub fn gather_speech(prompt: &str, action_url: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response>\
         <Gather input=\"speech\" action=\"{}\" method=\"POST\" timeout=\"5\">\
         <Say>{}</Say>\
         </Gather>\
         <Say>I did not receive any input. Goodbye.</Say>\
         <Hangup/>\
         </Response>",
        escape(action_url),
        escape(prompt),
    )
}

/// Speak the given lines and end the call.
pub fn say_and_hangup(lines: &[&str]) -> String {
    let says: String = lines
        .iter()
        .map(|line| format!("<Say>{}</Say>", escape(line)))
        .collect();
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>{says}<Hangup/></Response>")
}
