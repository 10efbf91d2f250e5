use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("failed to serialize json: {}", e),
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ErrorOut<'a> {
    pub code: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'a str>,
}

pub fn print_json_error(code: &str, message: &str, hint: Option<&str>) {
    let err = ErrorOut { code, message, hint };
    print_json(&err);
}

#[derive(Serialize, Debug)]
pub struct TurnOut<'a> {
    pub response: &'a str,
    pub actions: &'a [String],
    pub model: &'a str,
}

/// One chat turn: stripped prose and action lines on stdout, the model id
/// on stderr so piped output stays clean.
pub fn print_turn(json: bool, response: &str, actions: &[String], model: &str) {
    if json {
        print_json(&TurnOut { response, actions, model });
        return;
    }
    if !response.is_empty() {
        println!("{}", response);
    }
    for action in actions {
        println!("{}", action);
    }
    eprintln!("model: {}", model);
}

pub fn print_actions(json: bool, actions: &[String]) {
    if json {
        #[derive(Serialize)]
        struct Out<'a> {
            actions: &'a [String],
        }
        print_json(&Out { actions });
        return;
    }
    for action in actions {
        println!("{}", action);
    }
}
