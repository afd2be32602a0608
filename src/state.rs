use crate::admission::AdmissionMiddleware;
// app's shared state

pub struct AppState {
    pub admission: AdmissionMiddleware, // owns every rate counter
}

impl AppState {
    pub fn new(admission: AdmissionMiddleware) -> Self {
        Self { admission }
    }
}
