use std::collections::VecDeque;

/// Round-robin load balancer over the live endpoint set
#[derive(Debug, Default)]
pub struct LoadBalancer {
    endpoints: VecDeque<String>,
}

impl LoadBalancer {
    /// Create a new load balancer with an initial endpoint list
    pub fn new(endpoints: Vec<String>) -> Self {
        let mut lb = Self::default();
        for endpoint in endpoints {
            lb.add_endpoint(endpoint);
        }
        lb
    }

    /// Get the next endpoint using round-robin
    pub fn next_endpoint(&mut self) -> Option<String> {
        // Rotate: move first to back, return it
        let endpoint = self.endpoints.pop_front()?;
        self.endpoints.push_back(endpoint.clone());
        Some(endpoint)
    }

    pub fn add_endpoint(&mut self, endpoint: String) {
        if !self.endpoints.contains(&endpoint) {
            self.endpoints.push_back(endpoint);
        }
    }

    pub fn remove_endpoint(&mut self, endpoint: &str) {
        self.endpoints.retain(|e| e != endpoint);
    }

    /// Reconciles with a fresh endpoint set from discovery.
    ///
    /// Vanished endpoints are dropped and new ones appended; survivors keep
    /// their place in the rotation. Returns the endpoints that were removed.
    pub fn set_endpoints(&mut self, endpoints: &[String]) -> Vec<String> {
        let mut removed = Vec::new();
        self.endpoints.retain(|e| {
            let keep = endpoints.contains(e);
            if !keep {
                removed.push(e.clone());
            }
            keep
        });
        for endpoint in endpoints {
            self.add_endpoint(endpoint.clone());
        }
        removed
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.iter().cloned().collect()
    }
}
