// Tests module
// Discovery: end-to-end flows through the discovery service
// Scheduling: the timer-driven run loop under paused tokio time
